/// RGB888 color as composited onto the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u32);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0x000000);
    pub const WHITE: Rgb = Rgb(0xFFFFFF);
    pub const RED: Rgb = Rgb(0xEF0808);
    pub const YELLOW: Rgb = Rgb(0xEFFF00);
    pub const PURPLE_DARK: Rgb = Rgb(0x6008A1);
    pub const PURPLE_LIGHT: Rgb = Rgb(0xC990F3);
    pub const BLUE_DARK: Rgb = Rgb(0x180AEE);
    pub const BLUE_LIGHT: Rgb = Rgb(0x90E3FF);

    pub fn r(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn g(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn b(self) -> u8 {
        self.0 as u8
    }
}

/// One contiguous temperature interval and its visual identity. Bands are
/// half-open and tile the whole integer line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Frigid,
    Freezing,
    Cold,
    Cool,
    Warm,
    Hot,
    Scorching,
    OffScale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandStyle {
    pub background: Rgb,
    pub text: Rgb,
    pub scale: u8,
}

impl Band {
    /// First matching interval wins; total over all of `i32`.
    pub fn for_temperature(temperature: i32) -> Self {
        if temperature < 0 {
            Self::Frigid
        } else if temperature < 20 {
            Self::Freezing
        } else if temperature < 40 {
            Self::Cold
        } else if temperature < 65 {
            Self::Cool
        } else if temperature < 80 {
            Self::Warm
        } else if temperature < 200 {
            Self::Hot
        } else if temperature < 500 {
            Self::Scorching
        } else {
            Self::OffScale
        }
    }

    pub fn style(self) -> BandStyle {
        match self {
            Self::Frigid => BandStyle {
                background: Rgb::PURPLE_DARK,
                text: Rgb::WHITE,
                scale: 3,
            },
            Self::Freezing => BandStyle {
                background: Rgb::PURPLE_LIGHT,
                text: Rgb::WHITE,
                scale: 3,
            },
            Self::Cold => BandStyle {
                background: Rgb::BLUE_DARK,
                text: Rgb::WHITE,
                scale: 3,
            },
            Self::Cool => BandStyle {
                background: Rgb::BLUE_LIGHT,
                text: Rgb::BLACK,
                scale: 3,
            },
            Self::Warm => BandStyle {
                background: Rgb::YELLOW,
                text: Rgb::BLACK,
                scale: 3,
            },
            Self::Hot => BandStyle {
                background: Rgb::RED,
                text: Rgb::WHITE,
                scale: 2,
            },
            Self::Scorching => BandStyle {
                background: Rgb::WHITE,
                text: Rgb::BLACK,
                scale: 2,
            },
            Self::OffScale => BandStyle {
                background: Rgb::BLACK,
                text: Rgb::WHITE,
                scale: 3,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Frigid => "FRIGID",
            Self::Freezing => "FREEZING",
            Self::Cold => "COLD",
            Self::Cool => "COOL",
            Self::Warm => "WARM",
            Self::Hot => "HOT",
            Self::Scorching => "SCORCHING",
            Self::OffScale => "OFF_SCALE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subzero_is_frigid_white_on_dark_purple() {
        for t in [-1, -5, -40, i32::MIN] {
            let band = Band::for_temperature(t);
            assert_eq!(band, Band::Frigid);
            assert_eq!(band.style().background, Rgb::PURPLE_DARK);
            assert_eq!(band.style().text, Rgb::WHITE);
            assert_eq!(band.style().scale, 3);
        }
    }

    #[test]
    fn summer_day_is_warm_black_on_yellow() {
        let band = Band::for_temperature(72);
        assert_eq!(band, Band::Warm);
        assert_eq!(band.style().background, Rgb::YELLOW);
        assert_eq!(band.style().text, Rgb::BLACK);
        assert_eq!(band.style().scale, 3);
    }

    #[test]
    fn boundaries_fall_into_upper_band() {
        assert_eq!(Band::for_temperature(0), Band::Freezing);
        assert_eq!(Band::for_temperature(20), Band::Cold);
        assert_eq!(Band::for_temperature(40), Band::Cool);
        assert_eq!(Band::for_temperature(65), Band::Warm);
        assert_eq!(Band::for_temperature(80), Band::Hot);
        assert_eq!(Band::for_temperature(200), Band::Scorching);
        assert_eq!(Band::for_temperature(500), Band::OffScale);
        assert_eq!(Band::for_temperature(i32::MAX), Band::OffScale);
    }

    #[test]
    fn bands_step_monotonically_with_no_gaps() {
        let order = [
            Band::Frigid,
            Band::Freezing,
            Band::Cold,
            Band::Cool,
            Band::Warm,
            Band::Hot,
            Band::Scorching,
            Band::OffScale,
        ];
        let rank = |band: Band| order.iter().position(|b| *b == band).unwrap();

        let mut previous = rank(Band::for_temperature(-600));
        for t in -599..=600 {
            let current = rank(Band::for_temperature(t));
            assert!(current >= previous, "band regressed at t={t}");
            assert!(current - previous <= 1, "band skipped at t={t}");
            previous = current;
        }
    }
}
