use ratatui::prelude::Color;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Get the display color for an average rating
pub fn rating_color(rating: Option<f64>) -> Color {
  match rating {
    Some(r) if r >= 4.0 => Color::Green,
    Some(r) if r >= 2.5 => Color::Yellow,
    Some(_) => Color::Red,
    None => Color::DarkGray,
  }
}

/// Rating as filled and empty stars, out of five
pub fn stars(rating: u8) -> String {
  let filled = usize::from(rating.min(5));
  format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}
