use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::data::{Review, ReviewId, ReviewUpdate};
use crate::ui::renderfns::stars;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

/// Events emitted by the review form that the parent view acts on
#[derive(Debug, Clone, PartialEq)]
pub enum FormEvent {
  /// Fields passed validation. `editing` is the review being changed, if any.
  Submitted {
    editing: Option<ReviewId>,
    fields: ReviewUpdate,
  },
  Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Field {
  #[default]
  Name,
  Rating,
  Comments,
}

impl Field {
  fn next(self) -> Self {
    match self {
      Field::Name => Field::Rating,
      Field::Rating => Field::Comments,
      Field::Comments => Field::Name,
    }
  }

  fn previous(self) -> Self {
    match self {
      Field::Name => Field::Comments,
      Field::Rating => Field::Name,
      Field::Comments => Field::Rating,
    }
  }
}

/// Overlay form for adding or editing a review
#[derive(Debug, Clone)]
pub struct ReviewForm {
  name: TextInput,
  rating: u8,
  comments: TextInput,
  focus: Field,
  editing: Option<ReviewId>,
  error: Option<String>,
}

impl Default for ReviewForm {
  fn default() -> Self {
    Self {
      name: TextInput::new(),
      rating: 3,
      comments: TextInput::new(),
      focus: Field::Name,
      editing: None,
      error: None,
    }
  }
}

impl ReviewForm {
  /// Empty form for a new review
  pub fn new() -> Self {
    Self::default()
  }

  /// Form pre-filled from an existing review
  pub fn edit(review: &Review) -> Self {
    Self {
      name: TextInput::with_value(&review.name),
      rating: review.rating.clamp(1, 5),
      comments: TextInput::with_value(&review.comments),
      focus: Field::Name,
      editing: Some(review.id.clone()),
      error: None,
    }
  }

  pub fn is_edit(&self) -> bool {
    self.editing.is_some()
  }

  fn fields(&self) -> ReviewUpdate {
    ReviewUpdate {
      name: self.name.value().trim().to_string(),
      rating: self.rating,
      comments: self.comments.value().trim().to_string(),
    }
  }

  fn submit(&mut self) -> KeyResult<FormEvent> {
    let fields = self.fields();
    match fields.validate() {
      Ok(()) => KeyResult::Event(FormEvent::Submitted {
        editing: self.editing.clone(),
        fields,
      }),
      Err(e) => {
        self.error = Some(e.to_string());
        KeyResult::Handled
      }
    }
  }

  fn handle_rating(&mut self, key: KeyEvent) -> KeyResult<FormEvent> {
    match key.code {
      KeyCode::Left | KeyCode::Char('-') | KeyCode::Char('h') => {
        self.rating = self.rating.saturating_sub(1).max(1);
        KeyResult::Handled
      }
      KeyCode::Right | KeyCode::Char('+') | KeyCode::Char('l') => {
        self.rating = (self.rating + 1).min(5);
        KeyResult::Handled
      }
      KeyCode::Char(c @ '1'..='5') => {
        self.rating = c as u8 - b'0';
        KeyResult::Handled
      }
      // Swallow everything else so typing never leaks to the view
      _ => KeyResult::Handled,
    }
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<FormEvent> {
    match key.code {
      KeyCode::Esc => return KeyResult::Event(FormEvent::Cancelled),
      KeyCode::Enter => return self.submit(),
      KeyCode::Tab | KeyCode::Down => {
        self.focus = self.focus.next();
        return KeyResult::Handled;
      }
      KeyCode::BackTab | KeyCode::Up => {
        self.focus = self.focus.previous();
        return KeyResult::Handled;
      }
      _ => {}
    }

    self.error = None;
    let input = match self.focus {
      Field::Rating => return self.handle_rating(key),
      Field::Name => &mut self.name,
      Field::Comments => &mut self.comments,
    };
    match input.handle_key(key) {
      InputResult::NotHandled => KeyResult::NotHandled,
      _ => KeyResult::Handled,
    }
  }

  fn field_line<'a>(&self, field: Field, label: &'a str, value: Vec<Span<'a>>) -> Line<'a> {
    let focused = self.focus == field;
    let label_style = if focused {
      Style::default().fg(Color::Yellow).bold()
    } else {
      Style::default().fg(Color::DarkGray)
    };
    let mut spans = vec![Span::styled(format!("{:<10}", label), label_style)];
    spans.extend(value);
    Line::from(spans)
  }

  fn text_spans<'a>(&self, input: &'a TextInput, focused: bool) -> Vec<Span<'a>> {
    if !focused {
      return vec![Span::raw(input.value())];
    }
    let (before, after) = input.split_at_cursor();
    vec![
      Span::raw(before),
      Span::styled("_", Style::default().fg(Color::Yellow)), // Cursor
      Span::raw(after),
    ]
  }

  /// Render the form centered over `area`
  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    let width = (area.width * 70 / 100).clamp(30, 80).min(area.width);
    let height = 9.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    let overlay_area = Rect::new(x, y, width, height);

    // Clear the area behind the overlay
    frame.render_widget(Clear, overlay_area);

    let title = if self.is_edit() {
      " Edit review "
    } else {
      " New review "
    };
    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(title);

    let rating = stars(self.rating);
    let mut lines = vec![
      self.field_line(
        Field::Name,
        "Name",
        self.text_spans(&self.name, self.focus == Field::Name),
      ),
      self.field_line(
        Field::Rating,
        "Rating",
        vec![
          Span::styled(rating, Style::default().fg(Color::Yellow)),
          Span::styled(
            format!(" {}/5", self.rating),
            Style::default().fg(Color::DarkGray),
          ),
        ],
      ),
      self.field_line(
        Field::Comments,
        "Comments",
        self.text_spans(&self.comments, self.focus == Field::Comments),
      ),
      Line::raw(""),
    ];

    match &self.error {
      Some(error) => lines.push(Line::styled(
        error.clone(),
        Style::default().fg(Color::Red),
      )),
      None => lines.push(Line::from(vec![
        Span::styled("<tab>", Style::default().fg(Color::Cyan)),
        Span::styled(" next  ", Style::default().fg(Color::DarkGray)),
        Span::styled("<enter>", Style::default().fg(Color::Cyan)),
        Span::styled(" save  ", Style::default().fg(Color::DarkGray)),
        Span::styled("<esc>", Style::default().fg(Color::Cyan)),
        Span::styled(" cancel", Style::default().fg(Color::DarkGray)),
      ])),
    }

    let paragraph = Paragraph::new(lines)
      .block(block)
      .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, overlay_area);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn type_text(form: &mut ReviewForm, text: &str) {
    for c in text.chars() {
      form.handle_key(key(KeyCode::Char(c)));
    }
  }

  #[test]
  fn test_fill_and_submit() {
    let mut form = ReviewForm::new();
    type_text(&mut form, "Ana");
    form.handle_key(key(KeyCode::Tab));
    form.handle_key(key(KeyCode::Char('5')));
    form.handle_key(key(KeyCode::Tab));
    type_text(&mut form, "Great dumplings");

    assert_eq!(
      form.handle_key(key(KeyCode::Enter)),
      KeyResult::Event(FormEvent::Submitted {
        editing: None,
        fields: ReviewUpdate {
          name: "Ana".to_string(),
          rating: 5,
          comments: "Great dumplings".to_string(),
        },
      })
    );
  }

  #[test]
  fn test_invalid_submit_shows_error() {
    let mut form = ReviewForm::new();
    assert_eq!(form.handle_key(key(KeyCode::Enter)), KeyResult::Handled);
    assert!(form.error.is_some());

    // Typing clears the error
    type_text(&mut form, "A");
    assert!(form.error.is_none());
  }

  #[test]
  fn test_rating_stays_in_range() {
    let mut form = ReviewForm::new();
    form.handle_key(key(KeyCode::Tab));
    for _ in 0..10 {
      form.handle_key(key(KeyCode::Right));
    }
    assert_eq!(form.rating, 5);
    for _ in 0..10 {
      form.handle_key(key(KeyCode::Left));
    }
    assert_eq!(form.rating, 1);
    // Letters are swallowed on the rating field
    form.handle_key(key(KeyCode::Char('x')));
    assert_eq!(form.rating, 1);
  }

  #[test]
  fn test_edit_prefills_and_keeps_id() {
    let review = Review {
      id: ReviewId::Confirmed(7),
      restaurant_id: 1,
      name: "Steve".to_string(),
      rating: 4,
      comments: "Solid".to_string(),
      created_at: None,
      updated_at: None,
      dirty: false,
    };
    let mut form = ReviewForm::edit(&review);
    assert!(form.is_edit());
    type_text(&mut form, "n");

    match form.handle_key(key(KeyCode::Enter)) {
      KeyResult::Event(FormEvent::Submitted { editing, fields }) => {
        assert_eq!(editing, Some(ReviewId::Confirmed(7)));
        assert_eq!(fields.name, "Steven");
        assert_eq!(fields.rating, 4);
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn test_escape_cancels() {
    let mut form = ReviewForm::new();
    type_text(&mut form, "draft");
    assert_eq!(
      form.handle_key(key(KeyCode::Esc)),
      KeyResult::Event(FormEvent::Cancelled)
    );
  }
}
