/// Telescope pointing at the middle of one integration
///
/// Angles are in degrees; `lst` is local sidereal time in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pointing {
    /// Local sidereal time
    pub lst: f64,
    /// Right ascension
    pub ra: f64,
    /// Declination
    pub dec: f64,
    /// Galactic longitude
    pub galactic_l: f64,
    /// Galactic latitude
    pub galactic_b: f64,
    /// Feed angle
    pub feed_angle: f64,
    /// Position angle of the feed
    pub position_angle: f64,
    /// Parallactic angle
    pub parallactic_angle: f64,
    /// Telescope azimuth
    pub telescope_azimuth: f64,
    /// Telescope zenith angle
    pub telescope_zenith: f64,
}

impl Pointing {
    /// Fields in container column order
    pub(crate) fn to_array(self) -> [f64; 10] {
        [
            self.lst,
            self.ra,
            self.dec,
            self.galactic_l,
            self.galactic_b,
            self.feed_angle,
            self.position_angle,
            self.parallactic_angle,
            self.telescope_azimuth,
            self.telescope_zenith,
        ]
    }

    pub(crate) fn from_array(v: [f64; 10]) -> Pointing {
        Pointing {
            lst: v[0],
            ra: v[1],
            dec: v[2],
            galactic_l: v[3],
            galactic_b: v[4],
            feed_angle: v[5],
            position_angle: v[6],
            parallactic_angle: v[7],
            telescope_azimuth: v[8],
            telescope_zenith: v[9],
        }
    }
}
