mod restaurant_detail;
mod restaurant_list;

pub use restaurant_detail::RestaurantDetailView;
pub use restaurant_list::RestaurantListView;
