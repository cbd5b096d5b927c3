//! # Fee reconciliation server
//! The HTTP trigger surface of the fee reconciliation engine. It is responsible for:
//! * Running short syncs on demand and reporting their outcome.
//! * Queueing historical backfills and running them in the background.
//! * Serving the reconciled fee breakdowns, run reports and unmatched-fee diagnostics.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information, or run
//! the binary with any argument to print the help text.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `POST /api/sync`: Runs the requested sync kinds for a user and returns the run reports.
//! * `POST /api/backfill`: Queues a long-range sync. Responds with 202 and a job id.
//! * `GET /api/runs/{user_id}`: Recent run reports.
//! * `GET /api/breakdowns/{user_id}/{order_id}`: Fee breakdowns of an order's line items.
//! * `GET /api/unmatched/{user_id}`: Fees that could not be linked to a line item.
//! * `GET /api/account_fees/{user_id}`: Account-level fees, optionally filtered by `?period=YYYY-MM`.

pub mod backfill_worker;
pub mod cli;
pub mod config;
pub mod connector;
pub mod data_objects;
pub mod errors;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
