use thiserror::Error;

/// Why an allocation could not be satisfied.
///
/// Every variant reaches the caller of [`crate::allocate`] unchanged; the
/// `GlobalAlloc` and C surfaces flatten all of them into a null pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  /// A zero-byte request.
  #[error("zero-sized allocation request")]
  ZeroSize,
  /// The calling processor could not be resolved to an arena slot.
  #[error("current processor could not be resolved to an arena")]
  NoProcessor,
  /// The heap or mapping primitive refused to hand out more memory.
  #[error("out of memory")]
  OutOfMemory,
}
