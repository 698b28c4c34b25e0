pub mod size;
pub mod sort;
