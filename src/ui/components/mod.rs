mod filter_bar;
mod input;
mod review_form;

pub use filter_bar::FilterBar;
pub use input::{InputResult, TextInput};
pub use review_form::{FormEvent, ReviewForm};

/// Generic result type for component key handling.
///
/// Components report back to their parent view through this instead of
/// component-specific result enums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Key was consumed, no event for parent to handle
  Handled,
  /// Key was consumed, here's an event for parent to process
  Event(T),
  /// Key was not consumed, parent should try next handler
  NotHandled,
}
