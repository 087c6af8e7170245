pub mod assist;
pub mod events;
pub mod health;
pub mod pages;
pub mod webhooks;
