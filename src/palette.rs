//! Fixed table of five-colour palettes.

use glam::Vec3;

/// Colours per palette.
pub const PALETTE_SIZE: usize = 5;

/// Hex colour palettes, selected by index. The first 20 of the `nice-color-palettes` set.
pub const PALETTES: &[[&str; PALETTE_SIZE]] = &[
    ["#69d2e7", "#a7dbd8", "#e0e4cc", "#f38630", "#fa6900"],
    ["#fe4365", "#fc9d9a", "#f9cdad", "#c8c8a9", "#83af9b"],
    ["#ecd078", "#d95b43", "#c02942", "#542437", "#53777a"],
    ["#556270", "#4ecdc4", "#c7f464", "#ff6b6b", "#c44d58"],
    ["#774f38", "#e08e79", "#f1d4af", "#ece5ce", "#c5e0dc"],
    ["#e8ddcb", "#cdb380", "#036564", "#033649", "#031634"],
    ["#490a3d", "#bd1550", "#e97f02", "#f8ca00", "#8a9b0f"],
    ["#594f4f", "#547980", "#45ada8", "#9de0ad", "#e5fcc2"],
    ["#00a0b0", "#6a4a3c", "#cc333f", "#eb6841", "#edc951"],
    ["#e94e77", "#d68189", "#c6a49a", "#c6e5d9", "#f4ead5"],
    ["#3fb8af", "#7fc7af", "#dad8a7", "#ff9e9d", "#ff3d7f"],
    ["#d9ceb2", "#948c75", "#d5ded9", "#7a6a53", "#99b2b7"],
    ["#ffffff", "#cbe86b", "#f2e9e1", "#1c140d", "#cbe86b"],
    ["#efffcd", "#dce9be", "#555152", "#2e2633", "#99173c"],
    ["#343838", "#005f6b", "#008c9e", "#00b4cc", "#00dffc"],
    ["#413e4a", "#73626e", "#b38184", "#f0b49e", "#f7e4be"],
    ["#99b898", "#fecea8", "#ff847c", "#e84a5f", "#2a363b"],
    ["#ff4e50", "#fc913a", "#f9d423", "#ede574", "#e1f5c4"],
    ["#655643", "#80bca3", "#f6f7bd", "#e6ac27", "#bf4d28"],
    ["#00a8c6", "#40c0cb", "#f9f2e7", "#aee239", "#8fbe00"],
];

pub fn palette_count() -> usize {
    PALETTES.len()
}

/// Parse `#rrggbb` into RGB in `[0, 1]`.
pub fn parse_hex(hex: &str) -> Option<Vec3> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(digits.get(range)?, 16).ok().map(|v| v as f32 / 255.0)
    };
    Some(Vec3::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

/// Colours of palette `index`, clamped into range.
pub fn colors(index: usize) -> [Vec3; PALETTE_SIZE] {
    let palette = PALETTES[index.min(PALETTES.len() - 1)];
    palette.map(|hex| parse_hex(hex).unwrap_or(Vec3::ONE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("#ffffff"), Some(Vec3::ONE));
        assert_eq!(parse_hex("000000"), Some(Vec3::ZERO));
        let c = parse_hex("#ff8000").unwrap();
        assert_eq!(c.x, 1.0);
        assert!((c.y - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(parse_hex("#fff"), None);
        assert_eq!(parse_hex("#gg0000"), None);
    }

    #[test]
    fn test_all_palettes_parse() {
        for palette in PALETTES {
            for hex in palette {
                assert!(parse_hex(hex).is_some(), "bad colour {hex}");
            }
        }
    }

    #[test]
    fn test_out_of_range_index_clamps() {
        assert_eq!(palette_count(), 20);
        // The top of the original 0..99 slider lands on the last carried palette.
        assert_eq!(colors(99), colors(19));
        assert_eq!(colors(10_000), colors(palette_count() - 1));
    }
}
