//! # Map Presenter
//!
//! Pure projection of the cached Latest Reading into a renderable frame.
//!
//! The presenter makes no calls of its own. Feeding it a new reading with
//! the same position but a different crash flag only changes the marker
//! style and banner; the frame stays a `Position` frame.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::model::LatestReading;

/// Banner shown while a crash is flagged
pub const CRASH_BANNER: &str = "⚠️ Crash Detected!";

/// How the position marker is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerStyle {
    Normal,
    Crash,
}

impl MarkerStyle {
    pub fn from_crash(crash_detected: bool) -> Self {
        if crash_detected {
            Self::Crash
        } else {
            Self::Normal
        }
    }

    /// Marker colour on the map
    pub fn color(self) -> &'static str {
        match self {
            Self::Normal => "blue",
            Self::Crash => "red",
        }
    }
}

/// Marker at a `(lat, lng)` position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub latitude: f64,
    pub longitude: f64,
    pub style: MarkerStyle,
}

/// Text block shown next to the marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoPanel {
    pub latitude: String,
    pub longitude: String,
    pub status: &'static str,
    pub last_updated: String,
}

/// One renderable state of the map view.
#[derive(Debug, Clone, PartialEq)]
pub enum MapFrame {
    /// First fetch still pending
    Loading,
    /// Fetches settled but no reading exists yet
    NoData,
    Position {
        marker: Marker,
        info: InfoPanel,
        banner: Option<&'static str>,
    },
}

impl MapFrame {
    pub fn marker(&self) -> Option<&Marker> {
        match self {
            MapFrame::Position { marker, .. } => Some(marker),
            _ => None,
        }
    }

    pub fn banner(&self) -> Option<&'static str> {
        match self {
            MapFrame::Position { banner, .. } => *banner,
            _ => None,
        }
    }
}

/// Stateless renderer for the map view.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapPresenter;

impl MapPresenter {
    /// Build the frame for the current feed.
    ///
    /// A cached reading is shown even while `loading` is set, so a refresh
    /// never blanks a map that already has a position.
    pub fn render(reading: Option<&LatestReading>, loading: bool) -> MapFrame {
        let Some(reading) = reading else {
            return if loading {
                MapFrame::Loading
            } else {
                MapFrame::NoData
            };
        };

        // Wire order is [lat, lng]
        let latitude = reading.location.latitude();
        let longitude = reading.location.longitude();
        let style = MarkerStyle::from_crash(reading.crash_detected);

        MapFrame::Position {
            marker: Marker {
                latitude,
                longitude,
                style,
            },
            info: InfoPanel {
                latitude: format!("{:.6}", latitude),
                longitude: format!("{:.6}", longitude),
                status: status_text(reading.crash_detected),
                last_updated: format_timestamp(reading.updated_at),
            },
            banner: reading.crash_detected.then_some(CRASH_BANNER),
        }
    }
}

fn status_text(crash_detected: bool) -> &'static str {
    if crash_detected {
        "Crash Detected!"
    } else {
        "Normal"
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

impl fmt::Display for MapFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapFrame::Loading => write!(f, "Loading map..."),
            MapFrame::NoData => write!(f, "Waiting for device data..."),
            MapFrame::Position {
                marker,
                info,
                banner,
            } => {
                if let Some(banner) = banner {
                    writeln!(f, "{}", banner)?;
                }
                writeln!(
                    f,
                    "Marker: {} @ ({}, {})",
                    marker.style.color(),
                    info.latitude,
                    info.longitude
                )?;
                writeln!(f, "Latitude: {}", info.latitude)?;
                writeln!(f, "Longitude: {}", info.longitude)?;
                writeln!(f, "Status: {}", info.status)?;
                write!(f, "Last Updated: {}", info.last_updated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GeoPoint;
    use chrono::TimeZone;

    fn reading(lat: f64, lng: f64, crash: bool) -> LatestReading {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 8, 30, 15).unwrap();
        LatestReading {
            id: "r1".to_string(),
            user_id: "u1".to_string(),
            location: GeoPoint::from_lat_lng(lat, lng),
            accelerometer: None,
            crash_detected: crash,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_loading_and_no_data() {
        assert_eq!(MapPresenter::render(None, true), MapFrame::Loading);
        assert_eq!(MapPresenter::render(None, false), MapFrame::NoData);
        assert_eq!(MapFrame::NoData.to_string(), "Waiting for device data...");
    }

    #[test]
    fn test_marker_reads_lat_then_lng() {
        let frame = MapPresenter::render(Some(&reading(12.9, 77.6, false)), false);
        let marker = frame.marker().unwrap();
        assert_eq!(marker.latitude, 12.9);
        assert_eq!(marker.longitude, 77.6);
        assert_eq!(marker.style, MarkerStyle::Normal);
        assert!(frame.banner().is_none());
    }

    #[test]
    fn test_info_panel_six_decimals() {
        let frame = MapPresenter::render(Some(&reading(1.0, -2.1234567, false)), false);
        match frame {
            MapFrame::Position { info, .. } => {
                assert_eq!(info.latitude, "1.000000");
                assert_eq!(info.longitude, "-2.123457");
                assert_eq!(info.status, "Normal");
                assert_eq!(info.last_updated, "2026-10-16 08:30:15 UTC");
            }
            other => panic!("Expected position frame, got {:?}", other),
        }
    }

    #[test]
    fn test_crash_switches_style_and_banner() {
        let normal = MapPresenter::render(Some(&reading(1.0, 2.0, false)), false);
        let crash = MapPresenter::render(Some(&reading(1.0, 2.0, true)), false);

        assert_eq!(crash.marker().unwrap().style, MarkerStyle::Crash);
        assert_eq!(crash.banner(), Some(CRASH_BANNER));
        assert_eq!(
            normal.marker().unwrap().latitude,
            crash.marker().unwrap().latitude
        );
    }

    #[test]
    fn test_cached_reading_shown_while_loading() {
        let frame = MapPresenter::render(Some(&reading(1.0, 2.0, false)), true);
        assert!(frame.marker().is_some());
    }

    #[test]
    fn test_display_crash_frame() {
        let text = MapPresenter::render(Some(&reading(1.0, 2.0, true)), false).to_string();
        assert!(text.starts_with(CRASH_BANNER));
        assert!(text.contains("Marker: red @ (1.000000, 2.000000)"));
        assert!(text.contains("Status: Crash Detected!"));
    }

    #[test]
    fn test_display_normal_frame_uses_blue_marker() {
        assert_eq!(MarkerStyle::Normal.color(), "blue");
        assert_eq!(MarkerStyle::Crash.color(), "red");

        let text = MapPresenter::render(Some(&reading(1.0, 2.0, false)), false).to_string();
        assert!(text.starts_with("Marker: blue @ (1.000000, 2.000000)"));
        assert!(!text.contains(CRASH_BANNER));
    }
}
