//! Check handlers, one per spec domain
//!
//! Every handler turns declared entries into shell commands run through the
//! target's provider and records one result per check.

mod commands;
mod content;
mod files;
mod groups;
mod packages;
mod services;
mod users;

pub use commands::Commands;
pub use content::FileContent;
pub use files::Files;
pub use groups::Groups;
pub use packages::Packages;
pub use services::Services;
pub use users::Users;

use crate::spec::VerifySpec;
use checkrun::Dispatcher;

/// Dispatcher with every domain registered in check order
pub fn dispatcher() -> Dispatcher<VerifySpec> {
    Dispatcher::new()
        .register(Packages)
        .register(Files)
        .register(Services)
        .register(Users)
        .register(Groups)
        .register(FileContent)
        .register(Commands)
}

/// Quote a string for POSIX `sh`
pub fn quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@+,%".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(quote("nginx"), "nginx");
        assert_eq!(quote("/etc/nginx/nginx.conf"), "/etc/nginx/nginx.conf");
        assert_eq!(quote("my file"), "'my file'");
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote(""), "''");
        assert_eq!(quote("$(rm -rf /)"), "'$(rm -rf /)'");
    }

    #[test]
    fn test_dispatcher_order() {
        assert_eq!(
            dispatcher().domains(),
            vec!["packages", "files", "services", "users", "groups", "file_content", "commands"]
        );
    }
}
