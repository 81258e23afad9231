use std::fmt;

use zeroize::Zeroizing;

/// Connection details for a virtualization management endpoint.
///
/// Never serialized. The password is wiped from memory when the value is
/// dropped, which happens right after session establishment.
#[derive(Clone)]
pub struct Credentials {
    server: String,
    username: String,
    password: Zeroizing<String>,
}

impl Credentials {
    /// `server` is the management endpoint host name or address.
    pub fn new(
        server: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        self.password.as_str()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
