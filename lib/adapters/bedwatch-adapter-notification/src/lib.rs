//! Alert delivery channels.

pub mod service;

pub use service::{NotificationChannel, NotificationService};
