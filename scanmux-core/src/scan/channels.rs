use std::collections::BTreeSet;

use scanmux_model::{BucketSettings, ScanSettings, WifiBand};
use serde::{Deserialize, Serialize};

/// Frequencies (MHz) that make up each band on this device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelPlan {
    #[serde(rename = "2.4ghz")]
    pub band_24_ghz: Vec<u32>,
    #[serde(rename = "5ghz")]
    pub band_5_ghz: Vec<u32>,
    #[serde(rename = "5ghz_dfs")]
    pub band_5_ghz_dfs: Vec<u32>,
    #[serde(rename = "6ghz")]
    pub band_6_ghz: Vec<u32>,
    #[serde(rename = "60ghz")]
    pub band_60_ghz: Vec<u32>,
}

impl Default for ChannelPlan {
    fn default() -> Self {
        Self {
            band_24_ghz: (2412..=2472).step_by(5).collect(),
            band_5_ghz: vec![5180, 5200, 5220, 5240, 5745, 5765, 5785, 5805, 5825],
            band_5_ghz_dfs: [5260, 5280, 5300, 5320]
                .into_iter()
                .chain((5500..=5720).step_by(20))
                .collect(),
            band_6_ghz: (5955..=7115).step_by(20).collect(),
            band_60_ghz: vec![58320, 60480, 62640, 64800],
        }
    }
}

impl ChannelPlan {
    fn single_band(&self, band: WifiBand) -> &[u32] {
        match band {
            WifiBand::BAND_24_GHZ => &self.band_24_ghz,
            WifiBand::BAND_5_GHZ => &self.band_5_ghz,
            WifiBand::BAND_5_GHZ_DFS_ONLY => &self.band_5_ghz_dfs,
            WifiBand::BAND_6_GHZ => &self.band_6_ghz,
            WifiBand::BAND_60_GHZ => &self.band_60_ghz,
            _ => &[],
        }
    }

    /// All frequencies covered by `band`.
    pub fn frequencies(&self, band: WifiBand) -> impl Iterator<Item = u32> + '_ {
        band.iter()
            .flat_map(move |single| self.single_band(single).iter().copied())
    }

    /// Band a frequency belongs to, or unspecified when it is not in the plan.
    pub fn band_of(&self, frequency: u32) -> WifiBand {
        WifiBand::SINGLE_BANDS
            .into_iter()
            .find(|band| self.single_band(*band).contains(&frequency))
            .unwrap_or(WifiBand::UNSPECIFIED)
    }

    /// Whether a result seen on `frequency` falls inside what `settings` asked for.
    pub fn settings_contain(&self, settings: &ScanSettings, frequency: u32) -> bool {
        if settings.band.is_unspecified() {
            settings.channels.contains(&frequency)
        } else {
            settings.band.intersects(self.band_of(frequency))
        }
    }

    /// Number of distinct channels a request would sweep.
    pub fn channel_count(&self, settings: &ScanSettings) -> usize {
        let mut collection = ChannelCollection::default();
        collection.add_settings(self, settings);
        collection.len()
    }

    pub fn is_empty(&self) -> bool {
        WifiBand::SINGLE_BANDS
            .into_iter()
            .all(|band| self.single_band(band).is_empty())
    }
}

/// Union of bands and explicit channels accumulated from several requests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelCollection {
    bands: WifiBand,
    frequencies: BTreeSet<u32>,
}

impl ChannelCollection {
    pub fn add_band(&mut self, plan: &ChannelPlan, band: WifiBand) {
        self.bands |= band;
        self.frequencies.extend(plan.frequencies(band));
    }

    pub fn add_channel(&mut self, frequency: u32) {
        self.frequencies.insert(frequency);
    }

    pub fn add_settings(&mut self, plan: &ChannelPlan, settings: &ScanSettings) {
        if settings.band.is_unspecified() {
            for frequency in &settings.channels {
                self.add_channel(*frequency);
            }
        } else {
            self.add_band(plan, settings.band);
        }
    }

    pub fn contains_frequency(&self, frequency: u32) -> bool {
        self.frequencies.contains(&frequency)
    }

    /// True when every channel `settings` would sweep is already covered.
    /// A band the plan lists no channels for is covered only when the
    /// collection asked for that band by name.
    pub fn contains_settings(&self, plan: &ChannelPlan, settings: &ScanSettings) -> bool {
        if settings.band.is_unspecified() {
            return !settings.channels.is_empty()
                && settings
                    .channels
                    .iter()
                    .all(|frequency| self.contains_frequency(*frequency));
        }
        settings.band.iter().all(|single| {
            if self.bands.intersects(single) {
                return true;
            }
            let mut channels = plan.frequencies(single).peekable();
            channels.peek().is_some() && channels.all(|frequency| self.contains_frequency(frequency))
        })
    }

    pub fn bands(&self) -> WifiBand {
        self.bands
    }

    pub fn frequencies(&self) -> &BTreeSet<u32> {
        &self.frequencies
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Writes the channel selection into a bucket. The band is set only when
    /// the collection is exactly the union of whole bands.
    pub fn fill_bucket(&self, plan: &ChannelPlan, bucket: &mut BucketSettings) {
        let whole_bands: BTreeSet<u32> = plan.frequencies(self.bands).collect();
        bucket.band = if !self.bands.is_unspecified() && whole_bands == self.frequencies {
            self.bands
        } else {
            WifiBand::UNSPECIFIED
        };
        bucket.frequencies = self.frequencies.iter().copied().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_plan_classifies_frequencies() {
        let plan = ChannelPlan::default();
        assert_eq!(plan.band_of(2437), WifiBand::BAND_24_GHZ);
        assert_eq!(plan.band_of(5180), WifiBand::BAND_5_GHZ);
        assert_eq!(plan.band_of(5500), WifiBand::BAND_5_GHZ_DFS_ONLY);
        assert_eq!(plan.band_of(1234), WifiBand::UNSPECIFIED);
    }

    #[test]
    fn collection_covers_band_and_channel_requests() {
        let plan = ChannelPlan::default();
        let mut collection = ChannelCollection::default();
        collection.add_settings(&plan, &ScanSettings::for_band(WifiBand::BAND_24_GHZ));
        collection.add_settings(&plan, &ScanSettings::for_channels([5180]));

        assert!(collection.contains_settings(&plan, &ScanSettings::for_channels([2412, 5180])));
        assert!(collection.contains_settings(&plan, &ScanSettings::for_band(WifiBand::BAND_24_GHZ)));
        assert!(!collection.contains_settings(&plan, &ScanSettings::for_band(WifiBand::BAND_5_GHZ)));
    }

    #[test]
    fn band_without_planned_channels_is_not_covered_vacuously() {
        let plan = ChannelPlan {
            band_5_ghz: Vec::new(),
            ..ChannelPlan::default()
        };
        let mut collection = ChannelCollection::default();
        collection.add_settings(&plan, &ScanSettings::for_band(WifiBand::BAND_24_GHZ));
        assert!(!collection.contains_settings(&plan, &ScanSettings::for_band(WifiBand::BAND_5_GHZ)));
        assert!(!collection.contains_settings(&plan, &ScanSettings::default()));

        collection.add_settings(&plan, &ScanSettings::for_band(WifiBand::BAND_5_GHZ));
        assert!(collection.contains_settings(&plan, &ScanSettings::for_band(WifiBand::BAND_BOTH)));
    }

    #[test]
    fn fill_bucket_keeps_band_only_for_whole_bands() {
        let plan = ChannelPlan::default();
        let mut bucket = BucketSettings::default();

        let mut whole = ChannelCollection::default();
        whole.add_band(&plan, WifiBand::BAND_BOTH);
        whole.fill_bucket(&plan, &mut bucket);
        assert_eq!(bucket.band, WifiBand::BAND_BOTH);

        let mut mixed = whole.clone();
        mixed.add_channel(5500);
        mixed.fill_bucket(&plan, &mut bucket);
        assert_eq!(bucket.band, WifiBand::UNSPECIFIED);
        assert!(bucket.frequencies.contains(&5500));
    }
}
