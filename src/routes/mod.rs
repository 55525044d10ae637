pub mod health;
pub mod placement;
pub mod test_routes;
