//! Unit tests for the token codecs.

mod access_token_tests;
