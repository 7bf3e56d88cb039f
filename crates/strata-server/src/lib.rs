//! Strata Server - the REST + SSE surface.
//!
//! Routes:
//!
//! - `POST /turn`: run a turn; responds with an SSE stream of
//!   conversation events ending in `conversation_agent_complete`.
//! - `POST /profiles/{id}/activate`: synchronous activation.
//! - `GET /profiles/{id}/classification`: cached classification.
//! - `POST /consumption/check`: remaining hour/day/month budgets.
//! - `GET|POST /kg/{profile}/entities`, `DELETE /kg/{profile}/entities/{id}`
//! - `GET|POST /kg/{profile}/relationships`, `DELETE /kg/{profile}/relationships/{id}`
//! - `POST /kg/{profile}/search`: planner context text for a query.
//!
//! Authentication is an external collaborator; the authenticated
//! owner id arrives in the `x-owner-id` header placed by the fronting
//! auth layer.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
