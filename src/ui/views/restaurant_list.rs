use crate::data::{average_rating, format_rating, Cuisine, Filter, Neighborhood, Restaurant, Review};
use crate::gateway::Gateway;
use crate::query::{Query, QueryState, Task};
use crate::store::LocalStore;
use crate::sync::{SyncCache, SyncEvent};
use crate::ui::components::FilterBar;
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{rating_color, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::RestaurantDetailView;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use std::collections::HashMap;

/// Root view: all restaurants, filtered by cuisine and neighborhood
pub struct RestaurantListView<S: LocalStore, G: Gateway> {
  cache: SyncCache<S, G>,
  restaurants: Query<Vec<Restaurant>>,
  neighborhoods: Query<Vec<Neighborhood>>,
  cuisines: Query<Vec<Cuisine>>,
  reviews: Query<Vec<Review>>,
  ratings: HashMap<i64, f64>,
  cuisine_bar: FilterBar,
  neighborhood_bar: FilterBar,
  list_state: ListState,
  action: Option<Task<String>>,
  status: Option<String>,
}

fn restaurants_query<S, G>(
  cache: &SyncCache<S, G>,
  cuisine: Filter,
  neighborhood: Filter,
) -> Query<Vec<Restaurant>>
where
  S: LocalStore + 'static,
  G: Gateway + 'static,
{
  let cache = cache.clone();
  let mut query = Query::new(move || {
    let cache = cache.clone();
    async move {
      cache
        .filter_by_cuisine_and_neighborhood(cuisine, neighborhood)
        .await
        .map_err(|e| e.to_string())
    }
  });
  query.fetch();
  query
}

impl<S: LocalStore + 'static, G: Gateway + 'static> RestaurantListView<S, G> {
  pub fn new(cache: SyncCache<S, G>) -> Self {
    let restaurants = restaurants_query(&cache, Filter::Any, Filter::Any);

    let for_neighborhoods = cache.clone();
    let mut neighborhoods = Query::new(move || {
      let cache = for_neighborhoods.clone();
      async move { cache.fetch_neighborhoods().await.map_err(|e| e.to_string()) }
    });
    neighborhoods.fetch();

    let for_cuisines = cache.clone();
    let mut cuisines = Query::new(move || {
      let cache = for_cuisines.clone();
      async move { cache.fetch_cuisines().await.map_err(|e| e.to_string()) }
    });
    cuisines.fetch();

    let for_reviews = cache.clone();
    let mut reviews = Query::new(move || {
      let cache = for_reviews.clone();
      async move { cache.fetch_reviews().await.map_err(|e| e.to_string()) }
    });
    reviews.fetch();

    Self {
      cache,
      restaurants,
      neighborhoods,
      cuisines,
      reviews,
      ratings: HashMap::new(),
      cuisine_bar: FilterBar::new("Cuisine"),
      neighborhood_bar: FilterBar::new("Neighborhood"),
      list_state: ListState::default(),
      action: None,
      status: None,
    }
  }

  fn restaurants(&self) -> &[Restaurant] {
    self.restaurants.data().map(|v| v.as_slice()).unwrap_or(&[])
  }

  fn selected(&self) -> Option<&Restaurant> {
    self
      .list_state
      .selected()
      .and_then(|idx| self.restaurants().get(idx))
  }

  fn apply_filters(&mut self) {
    self.restaurants = restaurants_query(
      &self.cache,
      self.cuisine_bar.filter(),
      self.neighborhood_bar.filter(),
    );
    self.list_state.select(Some(0));
  }

  fn refresh(&mut self) {
    self.restaurants.refetch();
    self.neighborhoods.refetch();
    self.cuisines.refetch();
    self.reviews.refetch();
  }

  fn toggle_favorite(&mut self) {
    let Some(restaurant) = self.selected() else {
      return;
    };
    let id = restaurant.id;
    let cache = self.cache.clone();
    self.action = Some(Task::spawn(async move {
      let update = cache.toggle_favorite(id).await.map_err(|e| e.to_string())?;
      let verb = if update.restaurant.is_favorite {
        "Marked"
      } else {
        "Unmarked"
      };
      Ok(match update.warning {
        None => format!("{} {} as favorite", verb, update.restaurant.name),
        Some(e) => format!("{} {} locally, server not reached: {}", verb, update.restaurant.name, e),
      })
    }));
  }

  fn rebuild_ratings(&mut self) {
    let mut by_restaurant: HashMap<i64, Vec<Review>> = HashMap::new();
    for review in self.reviews.data().into_iter().flatten() {
      by_restaurant
        .entry(review.restaurant_id)
        .or_default()
        .push(review.clone());
    }
    self.ratings = by_restaurant
      .into_iter()
      .filter_map(|(id, reviews)| average_rating(&reviews).map(|avg| (id, avg)))
      .collect();
  }

  fn render_filters(&self, frame: &mut Frame, area: Rect) {
    let lines = vec![
      self.cuisine_bar.line("c"),
      self.neighborhood_bar.line("n"),
    ];
    frame.render_widget(Paragraph::new(lines), area);
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.restaurants().len();
    ensure_valid_selection(&mut self.list_state, len);

    let title = match self.restaurants.state() {
      QueryState::Loading => " Restaurants (loading...) ".to_string(),
      QueryState::Error(e) => format!(" Restaurants (error: {}) ", e),
      _ => format!(" Restaurants ({}) ", len),
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if self.restaurants().is_empty() && !self.restaurants.is_loading() {
      let content = if self.restaurants.is_error() {
        "Failed to load restaurants. Press 'r' to retry."
      } else {
        "No restaurants match these filters."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    // Collect items first to avoid borrow conflicts with list_state
    let items: Vec<ListItem> = self
      .restaurants()
      .iter()
      .map(|restaurant| {
        let rating = self.ratings.get(&restaurant.id).copied();
        let neighborhood = self
          .neighborhood_bar
          .name_of(restaurant.neighborhood_type_id)
          .unwrap_or("");
        let cuisine = self
          .cuisine_bar
          .name_of(restaurant.cuisine_type_id)
          .unwrap_or("");
        let line = Line::from(vec![
          Span::styled(
            if restaurant.is_favorite { "♥ " } else { "  " },
            Style::default().fg(Color::Red),
          ),
          Span::raw(format!("{:<30}", truncate(&restaurant.name, 30))),
          Span::raw(" "),
          Span::styled(
            format!("{:<14}", truncate(neighborhood, 14)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(" "),
          Span::styled(
            format!("{:<12}", truncate(cuisine, 12)),
            Style::default().fg(Color::Yellow),
          ),
          Span::raw(" "),
          Span::styled(format_rating(rating), Style::default().fg(rating_color(rating))),
        ]);
        ListItem::new(line)
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }

  // Key handling helpers for or_else chain pattern
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

  fn handle_filters(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match key.code {
      KeyCode::Char('c') => self.cuisine_bar.cycle(1),
      KeyCode::Char('C') => self.cuisine_bar.cycle(-1),
      KeyCode::Char('n') => self.neighborhood_bar.cycle(1),
      KeyCode::Char('N') => self.neighborhood_bar.cycle(-1),
      _ => return None,
    }
    self.apply_filters();
    Some(ViewAction::None)
  }

  fn handle_actions(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match key.code {
      KeyCode::Char('r') => {
        self.refresh();
        Some(ViewAction::None)
      }
      KeyCode::Char('f') => {
        self.toggle_favorite();
        Some(ViewAction::None)
      }
      KeyCode::Enter => {
        let restaurant = self.selected()?;
        Some(ViewAction::Push(Box::new(RestaurantDetailView::new(
          restaurant.id,
          restaurant.name.clone(),
          self.cache.clone(),
        ))))
      }
      KeyCode::Char('q') | KeyCode::Esc => Some(ViewAction::Pop),
      _ => None,
    }
  }
}

impl<S: LocalStore + 'static, G: Gateway + 'static> View for RestaurantListView<S, G> {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    self
      .handle_navigation(key)
      .or_else(|| self.handle_filters(key))
      .or_else(|| self.handle_actions(key))
      .unwrap_or(ViewAction::None)
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(2), // Filter bars
        Constraint::Min(1),    // Restaurant list
        Constraint::Length(1), // Status
      ])
      .split(area);

    self.render_filters(frame, chunks[0]);
    self.render_list(frame, chunks[1]);

    if let Some(status) = &self.status {
      let paragraph = Paragraph::new(format!(" {}", status)).style(Style::default().fg(Color::Yellow));
      frame.render_widget(paragraph, chunks[2]);
    }
  }

  fn breadcrumb_label(&self) -> String {
    "Restaurants".to_string()
  }

  fn tick(&mut self) {
    if self.restaurants.poll() {
      let len = self.restaurants().len();
      ensure_valid_selection(&mut self.list_state, len);
    }
    if self.neighborhoods.poll() {
      if let Some(neighborhoods) = self.neighborhoods.data() {
        let options = neighborhoods.iter().map(|n| (n.id, n.name.clone())).collect();
        self.neighborhood_bar.set_options(options);
      }
    }
    if self.cuisines.poll() {
      if let Some(cuisines) = self.cuisines.data() {
        let options = cuisines.iter().map(|c| (c.id, c.name.clone())).collect();
        self.cuisine_bar.set_options(options);
      }
    }
    if self.reviews.poll() {
      self.rebuild_ratings();
    }

    if let Some(outcome) = self.action.as_mut().and_then(|task| task.poll()) {
      self.action = None;
      self.status = Some(outcome.unwrap_or_else(|e| format!("Error: {}", e)));
      self.restaurants.refetch();
    }
  }

  fn on_sync_event(&mut self, event: &SyncEvent) {
    match event {
      SyncEvent::FavoriteConfirmed(_) => self.restaurants.refetch(),
      SyncEvent::ReviewConfirmed { .. } | SyncEvent::ReviewUpdated(_) => self.reviews.refetch(),
      SyncEvent::TaskRegistered(_) => {}
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("enter", "open").with_priority(10),
      ShortcutInfo::new("c/n", "filter").with_priority(20),
      ShortcutInfo::new("f", "favorite").with_priority(30),
      ShortcutInfo::new("r", "refresh").with_priority(80),
      ShortcutInfo::new("q", "quit").with_priority(90),
    ]
  }
}
