//! Hardware address validation.
//!
//! A [`DeviceAddress`] can only be obtained through [`validate`] (or the
//! equivalent `FromStr`/`TryFrom` impls), so holding one is proof that the
//! string is six `:`-separated hexadecimal octets. The stored form is
//! upper-case, which makes equality case-insensitive with respect to the input.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::AddressError;

/// Separator between octets in the canonical form.
pub const ADDRESS_DELIMITER: char = ':';

/// Length of `XX:XX:XX:XX:XX:XX`.
const ADDRESS_LEN: usize = 17;

/// A validated Bluetooth hardware address in canonical upper-case form.
///
/// # Examples
///
/// ```
/// use ems_types::DeviceAddress;
///
/// let addr: DeviceAddress = "aa:bb:cc:dd:ee:0f".parse().unwrap();
/// assert_eq!(addr.as_str(), "AA:BB:CC:DD:EE:0F");
/// assert_eq!(addr.octets(), [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x0F]);
///
/// assert!("AA-BB-CC-DD-EE-FF".parse::<DeviceAddress>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct DeviceAddress(String);

/// Validate a raw address string.
///
/// Accepts exactly six groups of two hexadecimal digits separated by `:`, in
/// any letter case. Anything else, including surrounding whitespace, is rejected.
pub fn validate(raw: &str) -> Result<DeviceAddress, AddressError> {
    if raw.is_empty() {
        return Err(AddressError::Empty);
    }

    let chars: Vec<char> = raw.chars().collect();
    if chars.len() != ADDRESS_LEN {
        return Err(AddressError::Length(chars.len()));
    }

    for (position, &c) in chars.iter().enumerate() {
        // Every third character (2, 5, 8, ...) separates two octets.
        if position % 3 == 2 {
            if c != ADDRESS_DELIMITER {
                return Err(AddressError::Delimiter { position, found: c });
            }
        } else if !c.is_ascii_hexdigit() {
            return Err(AddressError::NonHex { position, found: c });
        }
    }

    Ok(DeviceAddress(raw.to_ascii_uppercase()))
}

impl DeviceAddress {
    /// The canonical string form (`AA:BB:CC:DD:EE:FF`).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The six address octets, most significant first.
    pub fn octets(&self) -> [u8; 6] {
        let mut out = [0u8; 6];
        for (slot, group) in out.iter_mut().zip(self.0.split(ADDRESS_DELIMITER)) {
            // Validated on construction, so every group is two hex digits.
            *slot = u8::from_str_radix(group, 16).unwrap_or_default();
        }
        out
    }

    /// Build an address from raw octets.
    pub fn from_octets(octets: [u8; 6]) -> Self {
        let text = octets
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":");
        Self(text)
    }

    /// Whether this is the all-zero placeholder some platforms report when the
    /// real address is hidden.
    pub fn is_unspecified(&self) -> bool {
        self.octets() == [0u8; 6]
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for DeviceAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate(s)
    }
}

impl TryFrom<&str> for DeviceAddress {
    type Error = AddressError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate(value)
    }
}

impl TryFrom<String> for DeviceAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate(&value)
    }
}

impl From<DeviceAddress> for String {
    fn from(addr: DeviceAddress) -> Self {
        addr.0
    }
}
