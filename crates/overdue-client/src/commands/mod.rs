pub mod batch;
pub mod common;
pub mod customers;
pub mod escalate;
pub mod invoices;
pub mod policy;
pub mod reports;
pub mod service;
