//! Integration tests driving the vote engine end to end.

mod mock_oracle;
mod lifecycle;
mod http;
