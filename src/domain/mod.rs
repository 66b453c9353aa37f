pub mod actions;
pub mod attributes;
pub mod groups;
pub mod inventory_store;
pub mod network;
pub mod node;
pub mod reconcile;
pub mod repository;
pub mod service;
pub mod update;
pub mod validator;
