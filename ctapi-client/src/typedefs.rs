use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::Duration;

/// Opaque handle for a tag subscribed to a [`TagList`](crate::TagList).
///
/// Handles are assigned by the remote side and are only meaningful within
/// the list that issued them. The newtype keeps them from being mixed up
/// with unrelated integers.
///
/// # Examples
///
/// ```
/// use ctapi_client::TagHandle;
/// let handle = TagHandle(42u32);
/// assert_eq!(handle.0, 42u32);
/// ```
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagHandle(pub u32);

impl fmt::Display for TagHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Access-mode flags passed through to the remote open call.
///
/// Values match the CtApi `CT_OPEN_*` constants.
///
/// # Examples
///
/// ```
/// use ctapi_client::OpenFlags;
/// let flags = OpenFlags::READ_ONLY | OpenFlags::BATCH;
/// assert!(flags.contains(OpenFlags::BATCH));
/// assert!(!flags.contains(OpenFlags::RECONNECT));
/// assert_eq!(flags.bits(), 0x3);
/// ```
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpenFlags(u32);

impl OpenFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Read-only session (`CT_OPEN_READ_ONLY`).
    pub const READ_ONLY: Self = Self(0x0000_0001);
    /// Batch mode (`CT_OPEN_BATCH`).
    pub const BATCH: Self = Self(0x0000_0002);
    /// Extended mode (`CT_OPEN_EXTENDED`).
    pub const EXTENDED: Self = Self(0x0000_0004);
    /// Let the driver reconnect on its own (`CT_OPEN_RECONNECT`).
    pub const RECONNECT: Self = Self(0x0000_0008);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(OpenFlags, &str); 4] = [
            (OpenFlags::READ_ONLY, "READ_ONLY"),
            (OpenFlags::BATCH, "BATCH"),
            (OpenFlags::EXTENDED, "EXTENDED"),
            (OpenFlags::RECONNECT, "RECONNECT"),
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "OpenFlags(NONE)")
        } else {
            write!(f, "OpenFlags({})", set.join(" | "))
        }
    }
}

/// Parameters handed to [`CtConnector::open`](crate::CtConnector::open).
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectParams {
    /// Host name or address of the SCADA server.
    pub address: String,
    /// User name, passed through untouched.
    pub user: String,
    /// Password, passed through untouched. Redacted from `Debug` output.
    pub password: String,
    /// Access-mode flags.
    pub flags: OpenFlags,
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("address", &self.address)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("flags", &self.flags)
            .finish()
    }
}

/// A refreshed tag value, as returned by [`TagList::get_value`](crate::TagList::get_value).
#[derive(Debug, Clone, PartialEq)]
pub struct TagValue {
    /// Tag name as it was added.
    pub tag: String,
    /// Handle the tag is subscribed under.
    pub handle: TagHandle,
    /// Value from the last successful refresh.
    pub value: f64,
    /// Local time of that refresh, formatted for display.
    pub refreshed_at: String,
}

/// Default per-request deadline for the async client.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default worker channel depth.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;
