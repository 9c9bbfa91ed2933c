use derive_more::{Display, From, Into};

/// SCHC rule identifier.
///
/// On LoRaWAN the rule id travels out of band as the frame port (`FPort`), so
/// it is carried next to the fragment bytes rather than inside them.
///
/// # Examples
///
/// ```
/// use schc_gateway::codec::RuleId;
/// let rule = RuleId::new(20);
/// assert_eq!(rule.get(), 20);
/// assert_eq!(rule.to_string(), "20");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into)]
#[display("{_0}")]
pub struct RuleId(u8);

impl RuleId {
    /// Create a new rule identifier.
    #[must_use]
    pub const fn new(value: u8) -> Self { Self(value) }

    /// Return the inner numeric identifier.
    #[must_use]
    pub const fn get(self) -> u8 { self.0 }
}
