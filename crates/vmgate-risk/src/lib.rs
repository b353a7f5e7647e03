//! The request-risk gate (§4.7): a tiered rate limiter followed by a
//! weighted header/ASN scorer, both consulted before any protected route
//! runs.

pub mod asn;
pub mod rate_limit;
pub mod scorer;

pub use asn::{AsnLookup, AsnTable};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use scorer::{score_request, RequestSignals, ScoreResult};
