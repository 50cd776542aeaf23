//! End-to-end flows between a requester and simulated guardians.

mod flows;
