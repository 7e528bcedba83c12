/// Impersonation level a dialing client grants the server.
///
/// Windows named pipes let the server act with the client's security context
/// up to this level. Unix domain sockets have no equivalent and ignore it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImpersonationLevel {
    /// The server cannot identify or impersonate the client.
    Anonymous,
    /// The server can identify the client but not impersonate it.
    Identification,
    /// The server can impersonate the client on the local machine.
    Impersonation,
    /// The server can impersonate the client on remote machines too.
    #[default]
    Delegation,
}

impl ImpersonationLevel {
    /// The highest level the transport offers.
    pub const MAXIMUM: Self = Self::Delegation;

    /// Lowercase label for logs and CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Identification => "identification",
            Self::Impersonation => "impersonation",
            Self::Delegation => "delegation",
        }
    }

    /// `CreateFileW` security quality-of-service flags for this level.
    #[cfg(windows)]
    pub(crate) fn sqos_flags(self) -> u32 {
        use windows_sys::Win32::Storage::FileSystem::{
            SECURITY_ANONYMOUS, SECURITY_DELEGATION, SECURITY_IDENTIFICATION,
            SECURITY_IMPERSONATION, SECURITY_SQOS_PRESENT,
        };

        let level = match self {
            Self::Anonymous => SECURITY_ANONYMOUS,
            Self::Identification => SECURITY_IDENTIFICATION,
            Self::Impersonation => SECURITY_IMPERSONATION,
            Self::Delegation => SECURITY_DELEGATION,
        };
        SECURITY_SQOS_PRESENT | level
    }
}

impl std::fmt::Display for ImpersonationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_maximum() {
        assert_eq!(ImpersonationLevel::default(), ImpersonationLevel::MAXIMUM);
        assert_eq!(ImpersonationLevel::MAXIMUM.to_string(), "delegation");
    }
}
