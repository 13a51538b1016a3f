//! HTTP request handlers for Gatehouse.

pub mod cache;
pub mod dashboards;
pub mod health;
pub mod me;
pub mod metrics;
pub mod oauth;

pub use cache::{cache_clear, cache_info};
pub use dashboards::{api_data, api_data_scoped, ceo_dashboard, manager_dashboard};
pub use health::{health_check, home};
pub use me::{get_me, get_token};
pub use metrics::metrics_handler;
pub use oauth::{callback, login, logout, refresh_token};
