//! Fixed-size grouping for provider calls.

/// Split `items` into consecutive groups of at most `size` elements.
///
/// A `size` of zero is treated as one so callers can never loop forever.
pub fn batches<T>(items: &[T], size: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(size.max(1))
}
