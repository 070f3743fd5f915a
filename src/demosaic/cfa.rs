//! Colour filter array patterns.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::{DebayerError, DebayerResult};

/// A colour channel of the sensor or output image.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Red.
    Red = 0,
    /// Green.
    Green = 1,
    /// Blue.
    Blue = 2,
}

impl Channel {
    /// Index of the channel in an RGB pixel.
    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }

    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'R' => Some(Channel::Red),
            'G' => Some(Channel::Green),
            'B' => Some(Channel::Blue),
            _ => None,
        }
    }

    fn as_char(self) -> char {
        match self {
            Channel::Red => 'R',
            Channel::Green => 'G',
            Channel::Blue => 'B',
        }
    }
}

/// The 2x2 Bayer colour filter array (CFA) pattern.
///
/// The sequence of R, G, B describe the colours of the top-left,
/// top-right, bottom-left, and bottom-right pixels in the 2x2 block,
/// in that order. Every block holds one red, one blue and two green filters.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BayerPattern {
    /// Red-Green-Green-Blue.
    #[serde(rename = "RGGB")]
    Rggb,
    /// Blue-Green-Green-Red.
    #[serde(rename = "BGGR")]
    Bggr,
    /// Green-Blue-Red-Green.
    #[serde(rename = "GBRG")]
    Gbrg,
    /// Green-Red-Blue-Green.
    #[serde(rename = "GRBG")]
    Grbg,
    /// Green-Red-Green-Blue.
    #[serde(rename = "GRGB")]
    Grgb,
    /// Green-Blue-Green-Red.
    #[serde(rename = "GBGR")]
    Gbgr,
    /// Red-Green-Blue-Green.
    #[serde(rename = "RGBG")]
    Rgbg,
    /// Blue-Green-Red-Green.
    #[serde(rename = "BGRG")]
    Bgrg,
}

impl BayerPattern {
    /// All eight legal patterns.
    pub const ALL: [BayerPattern; 8] = [
        BayerPattern::Rggb,
        BayerPattern::Bggr,
        BayerPattern::Gbrg,
        BayerPattern::Grbg,
        BayerPattern::Grgb,
        BayerPattern::Gbgr,
        BayerPattern::Rgbg,
        BayerPattern::Bgrg,
    ];

    /// Colours of the (0,0), (0,1), (1,0) and (1,1) positions.
    pub fn colors(&self) -> [Channel; 4] {
        use Channel::*;
        match self {
            BayerPattern::Rggb => [Red, Green, Green, Blue],
            BayerPattern::Bggr => [Blue, Green, Green, Red],
            BayerPattern::Gbrg => [Green, Blue, Red, Green],
            BayerPattern::Grbg => [Green, Red, Blue, Green],
            BayerPattern::Grgb => [Green, Red, Green, Blue],
            BayerPattern::Gbgr => [Green, Blue, Green, Red],
            BayerPattern::Rgbg => [Red, Green, Blue, Green],
            BayerPattern::Bgrg => [Blue, Green, Red, Green],
        }
    }

    /// The pattern with the given 2x2 colours, if it is a legal Bayer pattern.
    pub fn from_colors(colors: [Channel; 4]) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.colors() == colors)
    }

    /// Colour of the filter at `row`, `col`.
    #[inline(always)]
    pub fn color_at(&self, row: usize, col: usize) -> Channel {
        self.colors()[((row & 1) << 1) | (col & 1)]
    }

    /// Whether the two greens of the pattern sit on a diagonal of the 2x2 block.
    ///
    /// This is the case for RGGB, BGGR, GBRG and GRBG.
    pub fn is_standard(&self) -> bool {
        matches!(
            self,
            BayerPattern::Rggb | BayerPattern::Bggr | BayerPattern::Gbrg | BayerPattern::Grbg
        )
    }

    /// Pattern identifier, e.g. `"RGGB"`.
    pub fn id(&self) -> &'static str {
        match self {
            BayerPattern::Rggb => "RGGB",
            BayerPattern::Bggr => "BGGR",
            BayerPattern::Gbrg => "GBRG",
            BayerPattern::Grbg => "GRBG",
            BayerPattern::Grgb => "GRGB",
            BayerPattern::Gbgr => "GBGR",
            BayerPattern::Rgbg => "RGBG",
            BayerPattern::Bgrg => "BGRG",
        }
    }
}

impl fmt::Display for BayerPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for BayerPattern {
    type Err = DebayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.id().eq_ignore_ascii_case(s))
            .ok_or_else(|| DebayerError::InvalidPattern(s.to_string()))
    }
}

/// The 6x6 Fujifilm X-Trans colour filter array pattern, in row-major order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct XTransPattern {
    tile: [Channel; 36],
}

impl XTransPattern {
    /// Create a validated X-Trans pattern.
    ///
    /// # Errors
    /// [`DebayerError::InvalidPattern`] unless the tile holds 6 to 10 red,
    /// 16 to 24 green and 6 to 10 blue filters.
    pub fn new(tile: [Channel; 36]) -> DebayerResult<Self> {
        let pattern = XTransPattern { tile };
        let [r, g, b] = pattern.counts();
        if !(6..=10).contains(&r) || !(16..=24).contains(&g) || !(6..=10).contains(&b) {
            return Err(DebayerError::InvalidPattern(format!(
                "{} has {r} red, {g} green and {b} blue filters",
                pattern.id()
            )));
        }
        Ok(pattern)
    }

    /// Colour of the filter at `row`, `col`.
    #[inline(always)]
    pub fn color_at(&self, row: usize, col: usize) -> Channel {
        self.tile[(row % 6) * 6 + col % 6]
    }

    /// Number of red, green and blue filters in the 6x6 tile.
    pub fn counts(&self) -> [usize; 3] {
        self.tile.iter().fold([0; 3], |mut acc, c| {
            acc[c.index()] += 1;
            acc
        })
    }

    /// Pattern identifier: the 36 filter colours in row-major order.
    pub fn id(&self) -> String {
        self.tile.iter().map(|c| c.as_char()).collect()
    }
}

impl Default for XTransPattern {
    /// The layout of Fujifilm X-Trans sensors.
    fn default() -> Self {
        use Channel::{Blue as B, Green as G, Red as R};
        XTransPattern {
            tile: [
                G, G, R, G, G, B, //
                G, G, B, G, G, R, //
                B, R, G, R, B, G, //
                G, G, B, G, G, R, //
                G, G, R, G, G, B, //
                R, B, G, B, R, G, //
            ],
        }
    }
}

impl FromStr for XTransPattern {
    type Err = DebayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.chars().count() != 36 {
            return Err(DebayerError::InvalidPattern(format!(
                "X-Trans pattern must have 36 filters, got {s:?}"
            )));
        }
        let mut tile = [Channel::Green; 36];
        for (slot, c) in tile.iter_mut().zip(s.chars()) {
            *slot = Channel::from_char(c).ok_or_else(|| {
                DebayerError::InvalidPattern(format!("unknown filter {c:?} in {s:?}"))
            })?;
        }
        Self::new(tile)
    }
}

impl TryFrom<String> for XTransPattern {
    type Error = DebayerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<XTransPattern> for String {
    fn from(value: XTransPattern) -> Self {
        value.id()
    }
}

impl fmt::Display for XTransPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// A colour filter array pattern of either family.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CfaPattern {
    /// 2x2 Bayer pattern.
    Bayer(BayerPattern),
    /// 6x6 X-Trans pattern.
    XTrans(XTransPattern),
}

impl CfaPattern {
    /// Colour of the filter at `row`, `col`.
    #[inline]
    pub fn color_at(&self, row: usize, col: usize) -> Channel {
        match self {
            CfaPattern::Bayer(p) => p.color_at(row, col),
            CfaPattern::XTrans(p) => p.color_at(row, col),
        }
    }

    /// Check if this is a Bayer pattern.
    pub fn is_bayer(&self) -> bool {
        matches!(self, CfaPattern::Bayer(_))
    }

    /// Check if this is an X-Trans pattern.
    pub fn is_xtrans(&self) -> bool {
        matches!(self, CfaPattern::XTrans(_))
    }

    /// Pattern identifier, as recorded in the output metadata.
    pub fn id(&self) -> String {
        match self {
            CfaPattern::Bayer(p) => p.id().to_string(),
            CfaPattern::XTrans(p) => p.id(),
        }
    }
}

impl From<BayerPattern> for CfaPattern {
    fn from(value: BayerPattern) -> Self {
        CfaPattern::Bayer(value)
    }
}

impl From<XTransPattern> for CfaPattern {
    fn from(value: XTransPattern) -> Self {
        CfaPattern::XTrans(value)
    }
}

impl FromStr for CfaPattern {
    type Err = DebayerError;

    /// Four letters parse as a Bayer pattern, 36 letters as an X-Trans pattern.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().len() {
            36 => s.parse().map(CfaPattern::XTrans),
            _ => s.parse().map(CfaPattern::Bayer),
        }
    }
}

impl fmt::Display for CfaPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bayer_cells() {
        for p in BayerPattern::ALL {
            let mut counts = [0; 3];
            for (r, c) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                counts[p.color_at(r + 10, c + 4).index()] += 1;
            }
            assert_eq!(counts, [1, 2, 1], "{p}");
            assert_eq!(p.id().parse::<BayerPattern>().unwrap(), p);
            assert_eq!(BayerPattern::from_colors(p.colors()), Some(p));
        }
        assert_eq!(BayerPattern::Grbg.color_at(0, 1), Channel::Red);
        assert_eq!(BayerPattern::Rgbg.color_at(1, 0), Channel::Blue);
        assert_eq!("bggr".parse::<BayerPattern>().unwrap(), BayerPattern::Bggr);
        assert!(matches!(
            "RGRB".parse::<BayerPattern>(),
            Err(DebayerError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_xtrans_default() {
        let p = XTransPattern::default();
        assert_eq!(p.counts(), [8, 20, 8]);
        assert_eq!(p.color_at(0, 2), Channel::Red);
        assert_eq!(p.color_at(6, 8), Channel::Red);
        let id = p.id();
        assert_eq!(id.len(), 36);
        assert_eq!(id.parse::<XTransPattern>().unwrap(), p);
    }

    #[test]
    fn test_xtrans_invalid() {
        assert!(matches!(
            "GGRGGB".parse::<XTransPattern>(),
            Err(DebayerError::InvalidPattern(_))
        ));
        let bad = "GGRGGXGGBGGRBRGRBGGGBGGRGGRGGBRBGBRG";
        assert!(matches!(
            bad.parse::<XTransPattern>(),
            Err(DebayerError::InvalidPattern(_))
        ));
        let all_green = "G".repeat(36);
        assert!(matches!(
            all_green.parse::<XTransPattern>(),
            Err(DebayerError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_cfa_pattern() {
        let p: CfaPattern = "GBRG".parse().unwrap();
        assert!(p.is_bayer());
        assert_eq!(p.color_at(1, 0), Channel::Red);
        let id = XTransPattern::default().id();
        let x: CfaPattern = id.parse().unwrap();
        assert!(x.is_xtrans());
        assert_eq!(x.id(), id);
    }

    #[test]
    fn test_xtrans_serde() {
        let p = XTransPattern::default();
        let s = serde_json::to_string(&p).unwrap();
        assert_eq!(s, format!("\"{}\"", p.id()));
        let q: XTransPattern = serde_json::from_str(&s).unwrap();
        assert_eq!(p, q);
    }
}
