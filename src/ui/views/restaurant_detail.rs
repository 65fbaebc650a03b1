use crate::data::{average_rating, format_rating, NewReview, Restaurant, Review};
use crate::gateway::Gateway;
use crate::query::{Query, QueryState, Task};
use crate::store::LocalStore;
use crate::sync::{Submission, SyncCache, SyncEvent};
use crate::ui::components::{FormEvent, KeyResult, ReviewForm};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{rating_color, stars};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use chrono::{Datelike, Local};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};

/// A restaurant with the names of its neighborhood and cuisine resolved
#[derive(Debug, Clone)]
struct RestaurantPage {
  restaurant: Restaurant,
  neighborhood: Option<String>,
  cuisine: Option<String>,
}

/// View for one restaurant: details, opening hours and reviews
pub struct RestaurantDetailView<S: LocalStore, G: Gateway> {
  id: i64,
  name: String,
  cache: SyncCache<S, G>,
  page: Query<RestaurantPage>,
  reviews: Query<Vec<Review>>,
  list_state: ListState,
  form: Option<ReviewForm>,
  action: Option<Task<String>>,
  status: Option<String>,
}

impl<S: LocalStore + 'static, G: Gateway + 'static> RestaurantDetailView<S, G> {
  pub fn new(id: i64, name: String, cache: SyncCache<S, G>) -> Self {
    let for_page = cache.clone();
    let mut page = Query::new(move || {
      let cache = for_page.clone();
      async move {
        let restaurant = cache.fetch_restaurant(id).await.map_err(|e| e.to_string())?;
        let (neighborhood, cuisine) = futures::future::join(
          cache.fetch_neighborhood(restaurant.neighborhood_type_id),
          cache.fetch_cuisine(restaurant.cuisine_type_id),
        )
        .await;
        // Names are decoration; the page still renders without them
        Ok(RestaurantPage {
          restaurant,
          neighborhood: neighborhood.ok().map(|n| n.name),
          cuisine: cuisine.ok().map(|c| c.name),
        })
      }
    });
    page.fetch();

    let for_reviews = cache.clone();
    let mut reviews = Query::new(move || {
      let cache = for_reviews.clone();
      async move { cache.fetch_reviews_for(id).await.map_err(|e| e.to_string()) }
    });
    reviews.fetch();

    Self {
      id,
      name,
      cache,
      page,
      reviews,
      list_state: ListState::default(),
      form: None,
      action: None,
      status: None,
    }
  }

  fn reviews(&self) -> &[Review] {
    self.reviews.data().map(|v| v.as_slice()).unwrap_or(&[])
  }

  fn selected_review(&self) -> Option<&Review> {
    self
      .list_state
      .selected()
      .and_then(|idx| self.reviews().get(idx))
  }

  fn toggle_favorite(&mut self) {
    let id = self.id;
    let cache = self.cache.clone();
    self.action = Some(Task::spawn(async move {
      let update = cache.toggle_favorite(id).await.map_err(|e| e.to_string())?;
      let state = if update.restaurant.is_favorite {
        "Added to favorites"
      } else {
        "Removed from favorites"
      };
      Ok(match update.warning {
        None => state.to_string(),
        Some(e) => format!("{} locally, server not reached: {}", state, e),
      })
    }));
  }

  fn handle_form_event(&mut self, event: FormEvent) {
    self.form = None;
    let FormEvent::Submitted { editing, fields } = event else {
      return;
    };

    let cache = self.cache.clone();
    let restaurant_id = self.id;
    self.action = Some(Task::spawn(async move {
      match editing {
        None => {
          let review = NewReview {
            restaurant_id,
            name: fields.name,
            rating: fields.rating,
            comments: fields.comments,
          };
          let submission = cache.submit_review(review).await.map_err(|e| e.to_string())?;
          Ok(
            match submission {
              Submission::Confirmed(_) => "Review posted",
              Submission::Deferred(_) => "Review saved, it will be sent in the background",
              Submission::Queued(_) => "Offline: review queued until the server is reachable",
            }
            .to_string(),
          )
        }
        Some(id) => {
          let review = cache.edit_review(&id, fields).await.map_err(|e| e.to_string())?;
          Ok(if review.is_queued() {
            "Edit saved locally, it will be sent when online".to_string()
          } else {
            "Review updated".to_string()
          })
        }
      }
    }));
  }

  fn render_info(&self, frame: &mut Frame, area: Rect) {
    let title = match self.page.state() {
      QueryState::Loading => format!(" {} (loading...) ", self.name),
      QueryState::Error(e) => format!(" {} (error: {}) ", self.name, e),
      _ => format!(" {} ", self.name),
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if let Some(error) = self.page.error() {
      let paragraph = Paragraph::new(format!("Error: {}\n\nPress 'r' to retry.", error))
        .style(Style::default().fg(Color::Red));
      frame.render_widget(paragraph, inner);
      return;
    }

    let page = match self.page.data() {
      Some(page) => page,
      None => {
        let paragraph =
          Paragraph::new("Loading restaurant...").style(Style::default().fg(Color::DarkGray));
        frame.render_widget(paragraph, inner);
        return;
      }
    };
    let restaurant = &page.restaurant;
    let rating = average_rating(self.reviews());

    let label = |text: &'static str| Span::styled(text, Style::default().fg(Color::DarkGray));
    let mut lines = vec![
      Line::from(vec![label("Address:      "), Span::raw(&restaurant.address)]),
      Line::from(vec![
        label("Neighborhood: "),
        Span::styled(
          page.neighborhood.as_deref().unwrap_or("-"),
          Style::default().fg(Color::Cyan),
        ),
        label("   Cuisine: "),
        Span::styled(
          page.cuisine.as_deref().unwrap_or("-"),
          Style::default().fg(Color::Yellow),
        ),
      ]),
      Line::from(vec![
        label("Rating:       "),
        Span::styled(format_rating(rating), Style::default().fg(rating_color(rating))),
        Span::styled(
          format!("  ({} reviews)", self.reviews().len()),
          Style::default().fg(Color::DarkGray),
        ),
        Span::raw("   "),
        if restaurant.is_favorite {
          Span::styled("♥ favorite", Style::default().fg(Color::Red))
        } else {
          Span::styled("♡ not a favorite", Style::default().fg(Color::DarkGray))
        },
      ]),
      Line::from(vec![
        label("Page:         "),
        Span::raw(restaurant.page_url()),
        label("   Photo: "),
        Span::raw(restaurant.image_path().unwrap_or_else(|| "-".to_string())),
      ]),
      Line::raw(""),
    ];

    lines.push(Line::from(vec![
      label("Open today:   "),
      Span::styled(
        restaurant.hours_on(Local::now().weekday()),
        Style::default().fg(Color::Green),
      ),
    ]));
    for (day, spec) in restaurant.weekly_hours() {
      lines.push(Line::from(vec![
        Span::styled(format!("{:<14}", day), Style::default().fg(Color::DarkGray)),
        Span::raw(spec.replace(',', " &")),
      ]));
    }

    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, inner);
  }

  fn render_reviews(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.reviews().len();
    ensure_valid_selection(&mut self.list_state, len);

    let title = match self.reviews.state() {
      QueryState::Loading => " Reviews (loading...) ".to_string(),
      QueryState::Error(e) => format!(" Reviews (error: {}) ", e),
      _ => format!(" Reviews ({}) ", len),
    };

    let block = Block::default()
      .title(title)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if self.reviews().is_empty() && !self.reviews.is_loading() {
      let content = if self.reviews.is_error() {
        "Failed to load reviews. Press 'r' to retry."
      } else {
        "No reviews yet. Press 'a' to add one."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let items: Vec<ListItem> = self
      .reviews()
      .iter()
      .map(|review| {
        let date = review
          .created_at
          .map(|t| t.format("%B %-d, %Y").to_string())
          .unwrap_or_default();
        let mut header = vec![
          Span::styled(review.name.clone(), Style::default().bold()),
          Span::raw("  "),
          Span::styled(stars(review.rating), Style::default().fg(Color::Yellow)),
          Span::raw("  "),
          Span::styled(date, Style::default().fg(Color::DarkGray)),
        ];
        if review.is_queued() {
          header.push(Span::styled(
            "  (pending sync)",
            Style::default().fg(Color::Yellow).italic(),
          ));
        }
        ListItem::new(vec![
          Line::from(header),
          Line::raw(format!("  {}", review.comments)),
        ])
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(Style::default().bg(Color::DarkGray))
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }

  // Key handling helpers for or_else chain pattern
  fn handle_overlays(&mut self, key: KeyEvent) -> Option<ViewAction> {
    let form = self.form.as_mut()?;
    match form.handle_key(key) {
      KeyResult::Event(event) => self.handle_form_event(event),
      KeyResult::Handled | KeyResult::NotHandled => {}
    }
    // The form is modal, nothing falls through
    Some(ViewAction::None)
  }

  fn handle_navigation(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => {
        self.list_state.select_next();
        Some(ViewAction::None)
      }
      KeyCode::Char('k') | KeyCode::Up => {
        self.list_state.select_previous();
        Some(ViewAction::None)
      }
      _ => None,
    }
  }

  fn handle_actions(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match key.code {
      KeyCode::Char('r') => {
        self.page.refetch();
        self.reviews.refetch();
        Some(ViewAction::None)
      }
      KeyCode::Char('f') => {
        self.toggle_favorite();
        Some(ViewAction::None)
      }
      KeyCode::Char('a') => {
        self.form = Some(ReviewForm::new());
        Some(ViewAction::None)
      }
      KeyCode::Char('e') => {
        let form = ReviewForm::edit(self.selected_review()?);
        self.form = Some(form);
        Some(ViewAction::None)
      }
      KeyCode::Char('q') | KeyCode::Esc => Some(ViewAction::Pop),
      _ => None,
    }
  }
}

impl<S: LocalStore + 'static, G: Gateway + 'static> View for RestaurantDetailView<S, G> {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    self
      .handle_overlays(key)
      .or_else(|| self.handle_navigation(key))
      .or_else(|| self.handle_actions(key))
      .unwrap_or(ViewAction::None)
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(15), // Details and hours
        Constraint::Min(3),     // Reviews
        Constraint::Length(1),  // Status
      ])
      .split(area);

    self.render_info(frame, chunks[0]);
    self.render_reviews(frame, chunks[1]);

    if let Some(status) = &self.status {
      let paragraph = Paragraph::new(format!(" {}", status)).style(Style::default().fg(Color::Yellow));
      frame.render_widget(paragraph, chunks[2]);
    }

    if let Some(form) = &self.form {
      form.render_overlay(frame, area);
    }
  }

  fn breadcrumb_label(&self) -> String {
    self.name.clone()
  }

  fn tick(&mut self) {
    if self.page.poll() {
      if let Some(page) = self.page.data() {
        self.name = page.restaurant.name.clone();
      }
    }
    if self.reviews.poll() {
      let len = self.reviews().len();
      ensure_valid_selection(&mut self.list_state, len);
    }

    if let Some(outcome) = self.action.as_mut().and_then(|task| task.poll()) {
      self.action = None;
      self.status = Some(outcome.unwrap_or_else(|e| format!("Error: {}", e)));
      self.page.refetch();
      self.reviews.refetch();
    }
  }

  fn on_sync_event(&mut self, event: &SyncEvent) {
    match event {
      SyncEvent::FavoriteConfirmed(restaurant) if restaurant.id == self.id => self.page.refetch(),
      SyncEvent::ReviewConfirmed { review, .. } | SyncEvent::ReviewUpdated(review)
        if review.restaurant_id == self.id =>
      {
        self.reviews.refetch()
      }
      _ => {}
    }
  }

  fn is_editing(&self) -> bool {
    self.form.is_some()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    if self.form.is_some() {
      return vec![
        ShortcutInfo::new("tab", "next field").with_priority(10),
        ShortcutInfo::new("enter", "save").with_priority(20),
        ShortcutInfo::new("esc", "cancel").with_priority(30),
      ];
    }
    vec![
      ShortcutInfo::new("a", "add review").with_priority(10),
      ShortcutInfo::new("e", "edit review").with_priority(20),
      ShortcutInfo::new("f", "favorite").with_priority(30),
      ShortcutInfo::new("r", "refresh").with_priority(80),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
