use crate::data::Filter;
use crate::ui::renderfns::truncate;
use ratatui::prelude::*;

/// One filter axis rendered as tabs: "All" followed by each option.
#[derive(Debug, Clone)]
pub struct FilterBar {
  label: &'static str,
  options: Vec<(i64, String)>, // (id, name)
  selected: usize,             // 0 = All, 1+ = index into options
}

impl FilterBar {
  pub fn new(label: &'static str) -> Self {
    Self {
      label,
      options: Vec::new(),
      selected: 0,
    }
  }

  /// Replace the options, keeping the selected id if it is still offered
  pub fn set_options(&mut self, mut options: Vec<(i64, String)>) {
    let current = self.filter();
    options.sort_by_key(|(id, _)| *id);
    self.options = options;
    self.selected = match current {
      Filter::Any => 0,
      Filter::Only(id) => self
        .options
        .iter()
        .position(|(option, _)| *option == id)
        .map(|i| i + 1)
        .unwrap_or(0),
    };
  }

  pub fn filter(&self) -> Filter {
    match self.selected {
      0 => Filter::Any,
      n => self
        .options
        .get(n - 1)
        .map(|(id, _)| Filter::Only(*id))
        .unwrap_or(Filter::Any),
    }
  }

  /// Name of the option with `id`, if known
  pub fn name_of(&self, id: i64) -> Option<&str> {
    self
      .options
      .iter()
      .find(|(option, _)| *option == id)
      .map(|(_, name)| name.as_str())
  }

  /// Move the selection with wrapping
  pub fn cycle(&mut self, direction: i32) {
    // Total tabs = "All" + options
    let total_tabs = self.options.len() + 1;

    self.selected = if direction > 0 {
      (self.selected + 1) % total_tabs
    } else if self.selected == 0 {
      total_tabs - 1
    } else {
      self.selected - 1
    };
  }

  pub fn line(&self, key: &'static str) -> Line<'static> {
    let mut spans = vec![
      Span::styled(format!("<{}>", key), Style::default().fg(Color::Cyan)),
      Span::styled(
        format!(" {} ", self.label),
        Style::default().fg(Color::Yellow),
      ),
    ];

    let tab = |text: String, selected: bool| {
      let style = if selected {
        Style::default().fg(Color::Black).bg(Color::Cyan)
      } else {
        Style::default().fg(Color::Gray)
      };
      Span::styled(text, style)
    };

    spans.push(tab(" All ".to_string(), self.selected == 0));
    for (idx, (_, name)) in self.options.iter().enumerate() {
      spans.push(Span::styled("│", Style::default().fg(Color::DarkGray)));
      spans.push(tab(format!(" {} ", truncate(name, 15)), self.selected == idx + 1));
    }

    Line::from(spans)
  }
}
