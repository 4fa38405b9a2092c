//! Procedural test scenes compiled into the binary.
//!
//! Every scene is dominated by hard, aliased edges at a variety of angles so
//! the effect has something to work on. Some scenes also carry a depth map.

use image::{Luma, Rgba, RgbaImage};

use crate::gpu::DepthImage;

pub const SCENE_WIDTH: u32 = 1280;
pub const SCENE_HEIGHT: u32 = 720;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pattern {
    Checker { cell: u32 },
    Rings { spacing: f32 },
    Sunburst { wedges: u32 },
    Stripes { angle: f32, period: f32 },
    Disks { cell: u32 },
    Triangles { rows: u32 },
    Bars { count: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct BuiltinScene {
    pub name: &'static str,
    pub depth_name: Option<&'static str>,
    pattern: Pattern,
    foreground: [u8; 3],
    background: [u8; 3],
}

pub const SCENES: [BuiltinScene; 7] = [
    BuiltinScene {
        name: "Scene01.png",
        depth_name: None,
        pattern: Pattern::Checker { cell: 48 },
        foreground: [235, 235, 235],
        background: [20, 20, 24],
    },
    BuiltinScene {
        name: "Scene02.png",
        depth_name: None,
        pattern: Pattern::Rings { spacing: 36.0 },
        foreground: [250, 200, 60],
        background: [30, 40, 90],
    },
    BuiltinScene {
        name: "Scene03.png",
        depth_name: Some("Scene03.exr"),
        pattern: Pattern::Sunburst { wedges: 48 },
        foreground: [220, 60, 50],
        background: [240, 240, 220],
    },
    BuiltinScene {
        name: "Scene04.png",
        depth_name: Some("Scene04.exr"),
        pattern: Pattern::Stripes {
            angle: 0.35,
            period: 22.0,
        },
        foreground: [40, 160, 90],
        background: [15, 25, 20],
    },
    BuiltinScene {
        name: "Scene05.png",
        depth_name: None,
        pattern: Pattern::Disks { cell: 96 },
        foreground: [90, 140, 230],
        background: [245, 245, 245],
    },
    BuiltinScene {
        name: "Scene06.png",
        depth_name: Some("Scene06.exr"),
        pattern: Pattern::Triangles { rows: 9 },
        foreground: [200, 120, 220],
        background: [25, 10, 35],
    },
    BuiltinScene {
        name: "Scene07.png",
        depth_name: None,
        pattern: Pattern::Bars { count: 40 },
        foreground: [255, 255, 255],
        background: [0, 0, 0],
    },
];

pub fn find(name: &str) -> Option<&'static BuiltinScene> {
    SCENES.iter().find(|scene| scene.name == name)
}

/// Looks a scene up by the name of its depth companion.
pub fn find_depth(name: &str) -> Option<&'static BuiltinScene> {
    SCENES.iter().find(|scene| scene.depth_name == Some(name))
}

impl BuiltinScene {
    fn covers(&self, x: u32, y: u32) -> bool {
        let (w, h) = (SCENE_WIDTH as f32, SCENE_HEIGHT as f32);
        let (fx, fy) = (x as f32 + 0.5, y as f32 + 0.5);
        let (cx, cy) = (fx - w / 2.0, fy - h / 2.0);

        match self.pattern {
            Pattern::Checker { cell } => ((x / cell) + (y / cell)) % 2 == 0,
            Pattern::Rings { spacing } => ((cx * cx + cy * cy).sqrt() / spacing) as u32 % 2 == 0,
            Pattern::Sunburst { wedges } => {
                let turn = (cy.atan2(cx) / std::f32::consts::TAU + 0.5) * wedges as f32;
                turn as u32 % 2 == 0
            }
            Pattern::Stripes { angle, period } => {
                let along = fx * angle.cos() + fy * angle.sin();
                (along / period).rem_euclid(2.0) < 1.0
            }
            Pattern::Disks { cell } => {
                let half = cell as f32 / 2.0;
                let dx = (x % cell) as f32 + 0.5 - half;
                let dy = (y % cell) as f32 + 0.5 - half;
                let radius = half * (0.45 + 0.4 * (((x / cell) * 7 + (y / cell) * 3) % 5) as f32 / 5.0);
                dx * dx + dy * dy < radius * radius
            }
            Pattern::Triangles { rows } => {
                let row_height = h / rows as f32;
                let row = (fy / row_height) as u32;
                let local_y = fy - row as f32 * row_height;
                let base = row_height * 1.15;
                let offset = if row % 2 == 0 { 0.0 } else { base / 2.0 };
                let local_x = (fx + offset).rem_euclid(base) - base / 2.0;
                local_x.abs() < local_y * 0.5 * base / row_height
            }
            Pattern::Bars { count } => {
                // Bars grow thinner and steeper from left to right.
                let band = (fx / w * count as f32) as u32;
                let slope = 0.02 + band as f32 * 0.03;
                let local = fx - band as f32 * w / count as f32;
                local < (w / count as f32) * 0.5 + (fy - h / 2.0) * slope * 0.1
            }
        }
    }

    pub fn color(&self) -> RgbaImage {
        RgbaImage::from_fn(SCENE_WIDTH, SCENE_HEIGHT, |x, y| {
            let [r, g, b] = if self.covers(x, y) { self.foreground } else { self.background };
            Rgba([r, g, b, 255])
        })
    }

    /// Foreground floats in front of a background plane that recedes with height.
    pub fn depth(&self) -> Option<DepthImage> {
        if self.depth_name.is_none() {
            return None;
        }
        Some(DepthImage::from_fn(SCENE_WIDTH, SCENE_HEIGHT, |x, y| {
            let recede = y as f32 / SCENE_HEIGHT as f32;
            let value = if self.covers(x, y) {
                0.2 + 0.1 * (x as f32 / SCENE_WIDTH as f32)
            } else {
                0.6 + 0.35 * (1.0 - recede)
            };
            Luma([value])
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_names_are_unique_and_ordered() {
        let names: Vec<_> = SCENES.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), 7);
        for (i, name) in names.iter().enumerate() {
            assert_eq!(*name, format!("Scene{:02}.png", i + 1));
        }
    }

    #[test]
    fn test_depth_only_for_scenes_with_companion() {
        for scene in &SCENES {
            assert_eq!(scene.depth().is_some(), scene.depth_name.is_some(), "{}", scene.name);
        }
        assert!(find_depth("Scene03.exr").is_some());
        assert!(find_depth("Scene01.exr").is_none());
    }

    #[test]
    fn test_scenes_have_both_colors() {
        for scene in &SCENES {
            let image = scene.color();
            assert_eq!(image.dimensions(), (SCENE_WIDTH, SCENE_HEIGHT));
            let fg = Rgba([scene.foreground[0], scene.foreground[1], scene.foreground[2], 255]);
            let bg = Rgba([scene.background[0], scene.background[1], scene.background[2], 255]);
            assert!(image.pixels().any(|p| *p == fg), "{} has no foreground", scene.name);
            assert!(image.pixels().any(|p| *p == bg), "{} has no background", scene.name);
        }
    }

    #[test]
    fn test_unknown_name() {
        assert!(find("Scene08.png").is_none());
    }
}
