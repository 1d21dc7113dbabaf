//! Pin catalog and the authoritative pin state store.
//!
//! Everything in this module is plain data: the five named positions of a
//! Canadian five-pin rack, the standing/down control map, the per-scan change
//! vector, and the reset bookkeeping the orchestrator consults between
//! throws. The scanner marks pins down and the orchestrator stands them back
//! up; nothing else mutates a [`PinStateStore`].

use core::fmt;
use core::ops::Add;
use core::time::Duration;

/// Number of pins in a five-pin rack.
pub const PIN_COUNT: usize = 5;

/// Combined value of every pin; only a strike reaches it.
pub const STRIKE_VALUE: u8 = 15;

/// How long the position wait stays disabled after a third ball.
pub const SUPPRESSION_WINDOW: Duration = Duration::from_secs(8);

/// Logical pin positions, left to right as seen from the foul line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PinName {
    LeftTwo,
    LeftThree,
    CenterFive,
    RightThree,
    RightTwo,
}

impl PinName {
    /// Deterministic index for lookups into [`ALL_PINS`].
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            PinName::LeftTwo => 0,
            PinName::LeftThree => 1,
            PinName::CenterFive => 2,
            PinName::RightThree => 3,
            PinName::RightTwo => 4,
        }
    }

    /// Attempts to construct a [`PinName`] from a raw index.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(PinName::LeftTwo),
            1 => Some(PinName::LeftThree),
            2 => Some(PinName::CenterFive),
            3 => Some(PinName::RightThree),
            4 => Some(PinName::RightTwo),
            _ => None,
        }
    }

    /// Score value of the pin.
    #[must_use]
    pub const fn value(self) -> u8 {
        pin_by_name(self).value
    }

    /// Short label used by lane settings and the operator console.
    #[must_use]
    pub const fn label(self) -> &'static str {
        pin_by_name(self).label
    }

    /// Case-insensitive lookup by label (`lTwo`, `cFive`, ...).
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        ALL_PINS
            .iter()
            .find(|pin| pin.label.eq_ignore_ascii_case(label))
            .map(|pin| pin.name)
    }
}

impl fmt::Display for PinName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Static metadata for a pin position.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PinPosition {
    pub name: PinName,
    pub label: &'static str,
    pub value: u8,
}

impl PinPosition {
    pub const fn new(name: PinName, label: &'static str, value: u8) -> Self {
        Self { name, label, value }
    }
}

/// Compile-time catalog of every pin position.
pub const ALL_PINS: [PinPosition; PIN_COUNT] = [
    PinPosition::new(PinName::LeftTwo, "lTwo", 2),
    PinPosition::new(PinName::LeftThree, "lThree", 3),
    PinPosition::new(PinName::CenterFive, "cFive", 5),
    PinPosition::new(PinName::RightThree, "rThree", 3),
    PinPosition::new(PinName::RightTwo, "rTwo", 2),
];

/// Retrieve pin metadata by name.
#[must_use]
pub const fn pin_by_name(name: PinName) -> PinPosition {
    ALL_PINS[name.as_index()]
}

fn write_bits(f: &mut fmt::Formatter<'_>, bits: &[u8; PIN_COUNT]) -> fmt::Result {
    for bit in bits {
        f.write_str(if *bit == 0 { "0" } else { "1" })?;
    }
    Ok(())
}

/// Standing/down state per pin (1 = standing, 0 = down).
///
/// Backed by a fixed array so the map can never be partially populated.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ControlMap {
    bits: [u8; PIN_COUNT],
}

impl ControlMap {
    #[must_use]
    pub const fn all_standing() -> Self {
        Self {
            bits: [1; PIN_COUNT],
        }
    }

    #[must_use]
    pub const fn all_down() -> Self {
        Self {
            bits: [0; PIN_COUNT],
        }
    }

    /// Builds a map from raw bits in pin order; any non-zero bit means standing.
    #[must_use]
    pub const fn from_bits(bits: [u8; PIN_COUNT]) -> Self {
        let mut normalized = [0; PIN_COUNT];
        let mut index = 0;
        while index < PIN_COUNT {
            normalized[index] = if bits[index] == 0 { 0 } else { 1 };
            index += 1;
        }
        Self { bits: normalized }
    }

    /// Builds a map from a standing bitmask where bit `n` is the pin at index `n`.
    #[must_use]
    pub const fn from_standing_mask(mask: u8) -> Self {
        let mut bits = [0; PIN_COUNT];
        let mut index = 0;
        while index < PIN_COUNT {
            bits[index] = (mask >> index) & 1;
            index += 1;
        }
        Self { bits }
    }

    /// Returns the map with the single named pin knocked down.
    #[must_use]
    pub const fn with_down(mut self, pin: PinName) -> Self {
        self.bits[pin.as_index()] = 0;
        self
    }

    #[must_use]
    pub const fn is_standing(&self, pin: PinName) -> bool {
        self.bits[pin.as_index()] != 0
    }

    pub fn set_standing(&mut self, pin: PinName, standing: bool) {
        self.bits[pin.as_index()] = u8::from(standing);
    }

    /// Marks a standing pin down. Returns `false` when it was already down.
    pub fn knock_down(&mut self, pin: PinName) -> bool {
        let slot = &mut self.bits[pin.as_index()];
        if *slot == 0 {
            return false;
        }
        *slot = 0;
        true
    }

    #[must_use]
    pub const fn bits(&self) -> [u8; PIN_COUNT] {
        self.bits
    }

    #[must_use]
    pub fn standing_mask(&self) -> u8 {
        self.bits
            .iter()
            .enumerate()
            .fold(0, |mask, (index, bit)| mask | (bit << index))
    }

    #[must_use]
    pub fn is_all_down(&self) -> bool {
        self.bits.iter().all(|bit| *bit == 0)
    }

    #[must_use]
    pub fn is_all_standing(&self) -> bool {
        self.bits.iter().all(|bit| *bit != 0)
    }

    /// Iterates over pins currently marked down, in pin order.
    pub fn down_pins(&self) -> impl Iterator<Item = PinName> + '_ {
        ALL_PINS
            .iter()
            .map(|pin| pin.name)
            .filter(|name| !self.is_standing(*name))
    }

    /// Sum of the values of every pin marked down.
    #[must_use]
    pub fn down_value(&self) -> u8 {
        self.down_pins().map(PinName::value).sum()
    }

    /// Applies `label -> standing` pairs. Labels that name no pin are skipped
    /// and counted in the return value.
    pub fn apply_labels<'a, I>(&mut self, pairs: I) -> usize
    where
        I: IntoIterator<Item = (&'a str, bool)>,
    {
        let mut ignored = 0;
        for (label, standing) in pairs {
            match PinName::from_label(label) {
                Some(pin) => self.set_standing(pin, standing),
                None => ignored += 1,
            }
        }
        ignored
    }
}

impl Default for ControlMap {
    fn default() -> Self {
        Self::all_standing()
    }
}

impl fmt::Display for ControlMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_bits(f, &self.bits)
    }
}

/// Pins that went down during the current scan (1 = changed).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ChangeVector {
    bits: [u8; PIN_COUNT],
}

impl ChangeVector {
    #[must_use]
    pub const fn none() -> Self {
        Self {
            bits: [0; PIN_COUNT],
        }
    }

    #[must_use]
    pub const fn all() -> Self {
        Self {
            bits: [1; PIN_COUNT],
        }
    }

    #[must_use]
    pub const fn from_bits(bits: [u8; PIN_COUNT]) -> Self {
        let mut normalized = [0; PIN_COUNT];
        let mut index = 0;
        while index < PIN_COUNT {
            normalized[index] = if bits[index] == 0 { 0 } else { 1 };
            index += 1;
        }
        Self { bits: normalized }
    }

    pub fn clear(&mut self) {
        self.bits = [0; PIN_COUNT];
    }

    pub fn mark(&mut self, pin: PinName) {
        self.bits[pin.as_index()] = 1;
    }

    #[must_use]
    pub const fn is_changed(&self, pin: PinName) -> bool {
        self.bits[pin.as_index()] != 0
    }

    #[must_use]
    pub fn any(&self) -> bool {
        self.bits.iter().any(|bit| *bit != 0)
    }

    #[must_use]
    pub const fn bits(&self) -> [u8; PIN_COUNT] {
        self.bits
    }

    pub fn changed_pins(&self) -> impl Iterator<Item = PinName> + '_ {
        ALL_PINS
            .iter()
            .map(|pin| pin.name)
            .filter(|name| self.is_changed(*name))
    }

    /// Canadian five-pin value of the pins knocked down by this throw.
    #[must_use]
    pub fn value(&self) -> u8 {
        self.changed_pins().map(PinName::value).sum()
    }
}

impl fmt::Display for ChangeVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_bits(f, &self.bits)
    }
}

/// Outcome of a pin scan.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScanStatus {
    NoChange = 0,
    PartialChange = 1,
    Strike = 2,
}

impl ScanStatus {
    /// Numeric code reported alongside ball events.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn is_strike(self) -> bool {
        matches!(self, ScanStatus::Strike)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScanStatus::NoChange => "none",
            ScanStatus::PartialChange => "partial",
            ScanStatus::Strike => "strike",
        })
    }
}

/// Pending reset requests.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ResetFlags {
    pub needs_full_reset: bool,
    pub force_full_reset: bool,
}

impl ResetFlags {
    /// Consumes the external force request.
    pub fn take_force(&mut self) -> bool {
        core::mem::take(&mut self.force_full_reset)
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.needs_full_reset || self.force_full_reset
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Third-ball suppression of the position wait.
///
/// Expiry is lazy: [`ThirdBallSuppression::refresh`] must be called to
/// re-enable the wait once `restore_at` has passed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ThirdBallSuppression<TInstant> {
    enabled: bool,
    restore_at: Option<TInstant>,
}

impl<TInstant> ThirdBallSuppression<TInstant>
where
    TInstant: Copy + Ord + Add<Duration, Output = TInstant>,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enabled: true,
            restore_at: None,
        }
    }

    /// Disables the position wait until `now + SUPPRESSION_WINDOW`.
    pub fn arm(&mut self, now: TInstant) {
        self.enabled = false;
        self.restore_at = Some(now + SUPPRESSION_WINDOW);
    }

    /// Re-enables the wait when the window has elapsed. Returns `true` on the
    /// transition back to enabled.
    pub fn refresh(&mut self, now: TInstant) -> bool {
        match self.restore_at {
            Some(restore_at) if !self.enabled && now >= restore_at => {
                self.enabled = true;
                self.restore_at = None;
                true
            }
            _ => false,
        }
    }

    /// `true` while the position wait is being skipped.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.enabled
    }

    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub const fn restore_at(&self) -> Option<TInstant> {
        self.restore_at
    }
}

impl<TInstant> Default for ThirdBallSuppression<TInstant>
where
    TInstant: Copy + Ord + Add<Duration, Output = TInstant>,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Timestamps captured by the most recent reset pulse.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CycleTiming<TInstant> {
    /// Origin of the position-sensor wait.
    pub reset_called_at: Option<TInstant>,
    /// Kept for inspection only; nothing in the engine reads it.
    pub cycle_started_at: Option<TInstant>,
}

impl<TInstant: Copy> CycleTiming<TInstant> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reset_called_at: None,
            cycle_started_at: None,
        }
    }

    pub fn mark_reset(&mut self, now: TInstant) {
        self.reset_called_at = Some(now);
        self.cycle_started_at = Some(now);
    }
}

impl<TInstant: Copy> Default for CycleTiming<TInstant> {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory record of the rack and its reset bookkeeping.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PinStateStore<TInstant> {
    pub control: ControlMap,
    pub changes: ChangeVector,
    pub flags: ResetFlags,
    pub suppression: ThirdBallSuppression<TInstant>,
    pub timing: CycleTiming<TInstant>,
}

impl<TInstant> PinStateStore<TInstant>
where
    TInstant: Copy + Ord + Add<Duration, Output = TInstant>,
{
    /// Creates a store with every pin standing and nothing pending.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            control: ControlMap::all_standing(),
            changes: ChangeVector::none(),
            flags: ResetFlags {
                needs_full_reset: false,
                force_full_reset: false,
            },
            suppression: ThirdBallSuppression::new(),
            timing: CycleTiming::new(),
        }
    }

    /// Stands the rack back up and drops any pending reset request.
    pub fn stand_all(&mut self) {
        self.control = ControlMap::all_standing();
        self.changes.clear();
        self.flags.clear();
    }
}

impl<TInstant> Default for PinStateStore<TInstant>
where
    TInstant: Copy + Ord + Add<Duration, Output = TInstant>,
{
    fn default() -> Self {
        Self::new()
    }
}
