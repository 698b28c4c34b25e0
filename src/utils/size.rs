/// Approximate heap bytes owned by a stage structure.
/// Used to log the resident generation at every stage boundary.
pub trait HeapSize {
    fn heap_bytes(&self) -> usize;
}

impl HeapSize for String {
    #[inline]
    fn heap_bytes(&self) -> usize {
        self.capacity()
    }
}

impl HeapSize for Box<str> {
    #[inline]
    fn heap_bytes(&self) -> usize {
        self.len()
    }
}

impl<T: HeapSize> HeapSize for Vec<T> {
    fn heap_bytes(&self) -> usize {
        self.capacity() * std::mem::size_of::<T>()
            + self.iter().map(HeapSize::heap_bytes).sum::<usize>()
    }
}

impl HeapSize for (u32, u32) {
    #[inline]
    fn heap_bytes(&self) -> usize {
        0
    }
}

impl HeapSize for f64 {
    #[inline]
    fn heap_bytes(&self) -> usize {
        0
    }
}

/// Human readable byte count for log lines
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_vectors_count_inner_buffers() {
        let docs: Vec<String> = vec!["alpha".to_string(), "beta".to_string()];
        assert!(docs.heap_bytes() >= 2 * std::mem::size_of::<String>() + 9);
    }

    #[test]
    fn bytes_are_formatted_with_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MiB");
    }
}
