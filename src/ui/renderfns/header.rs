use crate::ui::view::ShortcutInfo;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// What the header shows about the app as a whole
pub struct HeaderInfo<'a> {
  pub title: Option<&'a str>,
  pub server_url: &'a str,
  pub online: bool,
  pub queued: usize,
}

/// Draw the header bar with logo, server, connectivity, and shortcuts
pub fn draw_header(frame: &mut Frame, area: Rect, info: &HeaderInfo, shortcuts: &[ShortcutInfo]) {
  let domain = extract_domain(info.server_url);

  let mut spans = vec![
    Span::styled(" fressen ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(
      format!(" {} ", info.title.unwrap_or(domain)),
      Style::default().fg(Color::White),
    ),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
  ];

  if info.online {
    spans.push(Span::styled(" ● online ", Style::default().fg(Color::Green)));
  } else {
    spans.push(Span::styled(" ○ offline ", Style::default().fg(Color::Red).bold()));
  }

  if info.queued > 0 {
    spans.push(Span::styled("│", Style::default().fg(Color::DarkGray)));
    spans.push(Span::styled(
      format!(" {} queued ", info.queued),
      Style::default().fg(Color::Yellow).bold(),
    ));
  }

  spans.push(Span::raw("  "));

  // Shortcuts - keys and brackets highlighted, descriptions dimmed
  let mut shortcuts = shortcuts.to_vec();
  shortcuts.sort_by_key(|s| s.priority);
  for (i, shortcut) in shortcuts.iter().enumerate() {
    if i > 0 {
      spans.push(Span::raw("   "));
    }
    spans.push(Span::styled(
      format!("<{}>", shortcut.key),
      Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::styled(
      format!(" {}", shortcut.label),
      Style::default().fg(Color::DarkGray),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));

  frame.render_widget(paragraph, area);
}

/// Extract host (and port) from the server URL
fn extract_domain(url: &str) -> &str {
  url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url)
    .split('/')
    .next()
    .unwrap_or(url)
}
