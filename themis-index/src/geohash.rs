//! 64-bit Morton (Z-order) geohashing and distance helpers (spec.md
//! §3.4/§4.5.4, §4.5.1). Grounded in
//! `original_source/src/index/secondary_index.cpp`'s `encodeGeohash`/
//! `decodeGeohash`/`haversineDistance`.

const LAT_MIN: f64 = -90.0;
const LAT_MAX: f64 = 90.0;
const LON_MIN: f64 = -180.0;
const LON_MAX: f64 = 180.0;
const EARTH_RADIUS_KM: f64 = 6371.0;
const KM_PER_DEGREE: f64 = 111.0;

/// Encodes a normalized `(lat, lon)` pair into a 16-hex-digit Morton code:
/// latitude bit `i` lands in output bit `2i`, longitude bit `i` in `2i+1`.
#[must_use]
pub fn encode(lat: f64, lon: f64) -> String {
    let lat_norm = ((lat - LAT_MIN) / (LAT_MAX - LAT_MIN)).clamp(0.0, 1.0);
    let lon_norm = ((lon - LON_MIN) / (LON_MAX - LON_MIN)).clamp(0.0, 1.0);

    let lat_bits = (lat_norm * u64::from(u32::MAX) as f64) as u64;
    let lon_bits = (lon_norm * u64::from(u32::MAX) as f64) as u64;

    let mut morton: u64 = 0;
    for i in 0..32 {
        morton |= ((lat_bits >> i) & 1) << (2 * i);
        morton |= ((lon_bits >> i) & 1) << (2 * i + 1);
    }
    format!("{morton:016x}")
}

/// Inverse of [`encode`]: recovers the normalized `(lat, lon)` the hex
/// string's cell was built from.
#[must_use]
pub fn decode(geohash_hex: &str) -> Option<(f64, f64)> {
    let morton = u64::from_str_radix(geohash_hex, 16).ok()?;

    let mut lat_bits: u64 = 0;
    let mut lon_bits: u64 = 0;
    for i in 0..32 {
        lat_bits |= ((morton >> (2 * i)) & 1) << i;
        lon_bits |= ((morton >> (2 * i + 1)) & 1) << i;
    }

    let lat_norm = lat_bits as f64 / u64::from(u32::MAX) as f64;
    let lon_norm = lon_bits as f64 / u64::from(u32::MAX) as f64;

    let lat = lat_norm * (LAT_MAX - LAT_MIN) + LAT_MIN;
    let lon = lon_norm * (LON_MAX - LON_MIN) + LON_MIN;
    Some((lat, lon))
}

/// Great-circle distance between two points, in kilometers.
#[must_use]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// A bounding box enclosing every point within `radius_km` of
/// `(center_lat, center_lon)`, via the local-equirectangular
/// approximation (1° latitude and longitude both ≈ 111 km at the
/// equator, longitude additionally scaled by `cos(center_lat)`).
#[must_use]
pub fn enclosing_box(center_lat: f64, center_lon: f64, radius_km: f64) -> (f64, f64, f64, f64) {
    let lat_delta = radius_km / KM_PER_DEGREE;
    let lon_delta = radius_km / (KM_PER_DEGREE * center_lat.to_radians().cos());
    (
        center_lat - lat_delta,
        center_lat + lat_delta,
        center_lon - lon_delta,
        center_lon + lon_delta,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrips_within_cell_precision() {
        let (lat, lon) = (48.137, 11.576);
        let hash = encode(lat, lon);
        let (back_lat, back_lon) = decode(&hash).expect("valid hex");
        assert!((back_lat - lat).abs() < 1e-4);
        assert!((back_lon - lon).abs() < 1e-4);
    }

    #[test]
    fn radius_search_includes_nearby_and_excludes_far() {
        let center = (48.137, 11.576);
        let near = (48.150, 11.580);
        let far = (48.200, 11.700);
        assert!(haversine_km(center.0, center.1, near.0, near.1) <= 3.0);
        assert!(haversine_km(center.0, center.1, far.0, far.1) > 3.0);
    }

    #[test]
    fn encode_clamps_out_of_range_coordinates() {
        let hash = encode(200.0, -500.0);
        let (lat, lon) = decode(&hash).expect("valid hex");
        assert!((lat - LAT_MAX).abs() < 1e-3);
        assert!((lon - LON_MIN).abs() < 1e-3);
    }
}
