// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Display aspect ratio resolution.

use std::fmt;
use std::fmt::Display;

use enumn::N;

/// Aspect ratio codes as reported by MPEG-family decoders. The 625 and 525 line variants only
/// differ by frame rate family and resolve to the same display ratio.
#[derive(PartialEq, Eq, N, Clone, Copy, Debug)]
#[repr(u32)]
pub enum AspectCode {
    Square = 1,
    FourThirds625 = 2,
    FourThirds525 = 3,
    SixteenNinths625 = 4,
    SixteenNinths525 = 5,
}

/// A display aspect ratio, always stored in lowest terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Aspect {
    num: u32,
    den: u32,
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

impl Aspect {
    pub const FOUR_THIRDS: Aspect = Aspect { num: 4, den: 3 };
    pub const SIXTEEN_NINTHS: Aspect = Aspect { num: 16, den: 9 };

    pub fn new(num: u32, den: u32) -> Self {
        match gcd(num, den) {
            0 => Aspect { num: 0, den: 0 },
            g => Aspect {
                num: num / g,
                den: den / g,
            },
        }
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn den(&self) -> u32 {
        self.den
    }
}

impl Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.num, self.den)
    }
}

/// Maps a codec aspect `code` to a display aspect ratio.
///
/// Unknown codes and the square pixel code both fall back to `width:height`.
pub fn resolve_aspect(width: u32, height: u32, code: u32) -> Aspect {
    use AspectCode::*;
    match AspectCode::n(code) {
        Some(FourThirds625) | Some(FourThirds525) => Aspect::FOUR_THIRDS,
        Some(SixteenNinths625) | Some(SixteenNinths525) => Aspect::SIXTEEN_NINTHS,
        Some(Square) | None => Aspect::new(width, height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_ratios_ignore_dimensions() {
        for (width, height) in [(720, 576), (720, 480), (352, 288), (1, 1)] {
            assert_eq!(resolve_aspect(width, height, 2), Aspect::FOUR_THIRDS);
            assert_eq!(resolve_aspect(width, height, 3), Aspect::FOUR_THIRDS);
            assert_eq!(resolve_aspect(width, height, 4), Aspect::SIXTEEN_NINTHS);
            assert_eq!(resolve_aspect(width, height, 5), Aspect::SIXTEEN_NINTHS);
        }
    }

    #[test]
    fn square_and_unknown_codes_use_pixel_dimensions() {
        assert_eq!(resolve_aspect(640, 480, 1), Aspect::FOUR_THIRDS);
        assert_eq!(resolve_aspect(1920, 1080, 1), Aspect::SIXTEEN_NINTHS);
        assert_eq!(resolve_aspect(352, 288, 0), Aspect::new(11, 9));
        assert_eq!(resolve_aspect(352, 288, 42), Aspect::new(11, 9));
    }

    #[test]
    fn resolution_is_one_of_three_values() {
        for code in 0..8 {
            let aspect = resolve_aspect(352, 240, code);
            assert!(
                aspect == Aspect::FOUR_THIRDS
                    || aspect == Aspect::SIXTEEN_NINTHS
                    || aspect == Aspect::new(352, 240),
                "code {} gave {}",
                code,
                aspect
            );
        }
    }

    #[test]
    fn aspect_is_reduced() {
        let aspect = Aspect::new(1280, 720);
        assert_eq!((aspect.num(), aspect.den()), (16, 9));
        assert_eq!(Aspect::new(0, 0), Aspect::new(0, 0));
        assert_eq!(Aspect::new(0, 0).num(), 0);
        assert_eq!(Aspect::new(5, 0), Aspect::new(1, 0));
        assert_eq!(Aspect::new(1280, 720).to_string(), "16:9");
    }
}
