use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use crate::error::{ModelError, Result};

/// Bit set of radio bands a scan may cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct WifiBand(u32);

impl WifiBand {
    pub const UNSPECIFIED: Self = Self(0);
    pub const BAND_24_GHZ: Self = Self(1 << 0);
    pub const BAND_5_GHZ: Self = Self(1 << 1);
    /// 5 GHz channels that require dynamic frequency selection.
    pub const BAND_5_GHZ_DFS_ONLY: Self = Self(1 << 2);
    pub const BAND_6_GHZ: Self = Self(1 << 3);
    pub const BAND_60_GHZ: Self = Self(1 << 4);

    pub const BAND_5_GHZ_WITH_DFS: Self =
        Self(Self::BAND_5_GHZ.0 | Self::BAND_5_GHZ_DFS_ONLY.0);
    pub const BAND_BOTH: Self = Self(Self::BAND_24_GHZ.0 | Self::BAND_5_GHZ.0);
    pub const BAND_BOTH_WITH_DFS: Self =
        Self(Self::BAND_BOTH.0 | Self::BAND_5_GHZ_DFS_ONLY.0);
    pub const ALL: Self = Self(0b1_1111);

    /// Single-bit bands in ascending order.
    pub const SINGLE_BANDS: [WifiBand; 5] = [
        Self::BAND_24_GHZ,
        Self::BAND_5_GHZ,
        Self::BAND_5_GHZ_DFS_ONLY,
        Self::BAND_6_GHZ,
        Self::BAND_60_GHZ,
    ];

    pub fn from_bits(bits: u32) -> Result<Self> {
        if bits & !Self::ALL.0 != 0 {
            return Err(ModelError::UnknownBandBits(bits));
        }
        Ok(Self(bits))
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_unspecified(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: WifiBand) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: WifiBand) -> bool {
        self.0 & other.0 != 0
    }

    /// Iterates the single-bit bands contained in this set.
    pub fn iter(self) -> impl Iterator<Item = WifiBand> {
        Self::SINGLE_BANDS
            .into_iter()
            .filter(move |band| self.contains(*band))
    }

    /// True when the scanned bands make up a complete sweep. DFS coverage is
    /// not required.
    pub const fn is_full_band_scan(self) -> bool {
        self.contains(Self::BAND_24_GHZ) && self.contains(Self::BAND_5_GHZ)
    }

    fn single_name(self) -> Option<&'static str> {
        match self {
            Self::BAND_24_GHZ => Some("2.4ghz"),
            Self::BAND_5_GHZ => Some("5ghz"),
            Self::BAND_5_GHZ_DFS_ONLY => Some("5ghz_dfs"),
            Self::BAND_6_GHZ => Some("6ghz"),
            Self::BAND_60_GHZ => Some("60ghz"),
            _ => None,
        }
    }
}

impl BitOr for WifiBand {
    type Output = WifiBand;

    fn bitor(self, rhs: Self) -> Self::Output {
        WifiBand(self.0 | rhs.0)
    }
}

impl BitOrAssign for WifiBand {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for WifiBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unspecified() {
            return f.write_str("unspecified");
        }
        let names: Vec<&str> =
            self.iter().filter_map(WifiBand::single_name).collect();
        f.write_str(&names.join("|"))
    }
}

impl FromStr for WifiBand {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        let mut band = WifiBand::UNSPECIFIED;
        for part in s.split('|').map(str::trim).filter(|p| !p.is_empty()) {
            band |= match part.to_ascii_lowercase().as_str() {
                "2.4ghz" | "24ghz" | "2g" => WifiBand::BAND_24_GHZ,
                "5ghz" | "5g" => WifiBand::BAND_5_GHZ,
                "5ghz_dfs" | "dfs" => WifiBand::BAND_5_GHZ_DFS_ONLY,
                "6ghz" | "6g" => WifiBand::BAND_6_GHZ,
                "60ghz" | "60g" => WifiBand::BAND_60_GHZ,
                "unspecified" => WifiBand::UNSPECIFIED,
                _ => return Err(ModelError::UnknownBandName(part.to_string())),
            };
        }
        Ok(band)
    }
}
