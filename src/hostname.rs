/// A validated hostname.
///
/// The client transmits this in DHCP option 12 when configured to do so.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Hostname<'a> {
    hostname: &'a str,
}

#[allow(clippy::len_without_is_empty)] // empty is not allowed by `new`
impl<'a> Hostname<'a> {
    /// Create a new hostname.
    ///
    /// This validates the hostname for [RFC-1035] compliance:
    ///
    /// - It is not empty and is 253 or fewer characters.
    /// - It contains only alphanumeric characters, `'-'`, and `'.'`.
    /// - Its labels (characters separated by `.`) are not empty, are 63
    ///   or fewer characters, and do not start or end with `'-'`.
    ///
    /// # Example
    ///
    /// ```
    /// use netboot_dhcp::Hostname;
    ///
    /// assert!(Hostname::new("is-valid-example").is_some());
    /// assert!(Hostname::new("this-is-not-?-valid").is_none());
    /// ```
    ///
    /// [RFC-1035]: https://www.rfc-editor.org/rfc/rfc1035
    pub const fn new(hostname: &'a str) -> Option<Self> {
        // const eval does not allow iterators or str::split here
        if hostname.is_empty() || hostname.len() > 253 {
            return None;
        }

        let bytes: &[u8] = hostname.as_bytes();
        let mut idx: usize = 0;
        let mut label_len: usize = 0;
        while idx < bytes.len() {
            let byte: u8 = bytes[idx];
            match byte {
                b'.' => {
                    if label_len == 0 || bytes[idx - 1] == b'-' {
                        return None;
                    }
                    label_len = 0;
                }
                b'-' => {
                    if label_len == 0 {
                        return None;
                    }
                    label_len += 1;
                }
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' => label_len += 1,
                _ => return None,
            }
            if label_len > 63 {
                return None;
            }
            idx += 1;
        }

        if label_len == 0 || bytes[bytes.len() - 1] == b'-' {
            return None;
        }

        Some(Self { hostname })
    }

    /// Create a new hostname, panicking if the hostname is invalid.
    ///
    /// # Panics
    ///
    /// This is the same as [`new`](Self::new), but it will panic on
    /// invalid hostnames. This should only be used in `const` contexts
    /// where the evaluation will fail at compile time.
    ///
    /// # Example
    ///
    /// ```
    /// use netboot_dhcp::Hostname;
    ///
    /// const HOSTNAME: Hostname = Hostname::new_unwrapped("valid.hostname");
    /// ```
    pub const fn new_unwrapped(hostname: &'a str) -> Self {
        match Self::new(hostname) {
            Some(hostname) => hostname,
            None => ::core::panic!("invalid hostname"),
        }
    }

    /// Length of the hostname in bytes.
    ///
    /// Guaranteed to fit the single length byte of a DHCP option record.
    pub const fn len(&self) -> u8 {
        self.hostname.len() as u8
    }

    /// Hostname as a byte slice.
    pub const fn as_bytes(&self) -> &[u8] {
        self.hostname.as_bytes()
    }

    /// Hostname as a string slice.
    pub const fn as_str(&self) -> &str {
        self.hostname
    }
}
