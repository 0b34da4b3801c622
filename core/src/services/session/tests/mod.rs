//! Unit tests for the session service.

mod refresh_tests;
