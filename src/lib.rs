//! Intake Assist: conversational patient intake and appointment booking
//! with a simulated notification outbox.

pub mod availability;
pub mod channels;
pub mod config;
pub mod controller;
pub mod error;
pub mod intake;
pub mod outbox;
pub mod routes;
