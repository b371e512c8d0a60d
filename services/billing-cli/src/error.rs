//! CLI error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("not logged in, run `billing-cli login <username> <password>` first")]
    NotLoggedIn,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_logged_in_points_at_login() {
        assert!(Error::NotLoggedIn.to_string().contains("billing-cli login"));
    }
}
