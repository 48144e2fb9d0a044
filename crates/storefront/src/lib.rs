//! Game Shop storefront library.
//!
//! The stateful client core of the storefront: the cart store, the checkout
//! flow, and the typed collaborators they need (backend API client, auth
//! session, payment SDK adapter, durable storage). Front ends such as the
//! `gs-cli` binary drive it through [`state::AppState`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod payment;
pub mod state;
pub mod storage;
