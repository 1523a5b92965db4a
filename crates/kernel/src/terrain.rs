use shardmap_common::MapId;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Number of grids along each axis of a map.
pub const MAX_NUMBER_OF_GRIDS: i32 = 64;
/// Edge length of one grid in world units.
pub const SIZE_OF_GRIDS: f64 = 533.333_333_33;
pub const CENTER_GRID_ID: i32 = MAX_NUMBER_OF_GRIDS / 2;
pub const CENTER_GRID_OFFSET: f64 = SIZE_OF_GRIDS / 2.0;

/// A grid cell coordinate on a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCoord {
    pub x: i32,
    pub y: i32,
}

impl GridCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Grid holding a world position. Computed in f64 so results match the
    /// tile extractor.
    pub fn from_world(x: f32, y: f32) -> Self {
        let x_offset = (f64::from(x) - CENTER_GRID_OFFSET) / SIZE_OF_GRIDS;
        let y_offset = (f64::from(y) - CENTER_GRID_OFFSET) / SIZE_OF_GRIDS;
        Self {
            x: (x_offset + f64::from(CENTER_GRID_ID) + 0.5) as i32,
            y: (y_offset + f64::from(CENTER_GRID_ID) + 0.5) as i32,
        }
    }

    /// Tile file coordinates are mirrored on both axes.
    pub fn to_tile(self) -> Option<(u32, u32)> {
        let gx = MAX_NUMBER_OF_GRIDS - 1 - self.x;
        let gy = MAX_NUMBER_OF_GRIDS - 1 - self.y;
        let range = 0..MAX_NUMBER_OF_GRIDS;
        if range.contains(&gx) && range.contains(&gy) {
            Some((gx as u32, gy as u32))
        } else {
            None
        }
    }
}

/// Source of terrain and collision geometry tiles.
pub trait TerrainSource: Send + Sync {
    fn has_map_tile(&self, map: MapId, gx: u32, gy: u32) -> bool;
    fn has_vmap_tile(&self, map: MapId, gx: u32, gy: u32) -> bool;
}

/// Terrain source with no geometry at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTerrain;

impl TerrainSource for NoTerrain {
    fn has_map_tile(&self, _map: MapId, _gx: u32, _gy: u32) -> bool {
        false
    }

    fn has_vmap_tile(&self, _map: MapId, _gx: u32, _gy: u32) -> bool {
        false
    }
}

/// Tiles laid out on disk as extracted by the map tools:
/// `maps/MMMMXXYY.map` and `vmaps/MMMM_XX_YY.vmtile`.
#[derive(Debug, Clone)]
pub struct DirectoryTerrain {
    root: PathBuf,
}

impl DirectoryTerrain {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn map_tile_path(&self, map: MapId, gx: u32, gy: u32) -> PathBuf {
        self.root
            .join("maps")
            .join(format!("{:04}{:02}{:02}.map", map.0, gx, gy))
    }

    pub fn vmap_tile_path(&self, map: MapId, gx: u32, gy: u32) -> PathBuf {
        self.root
            .join("vmaps")
            .join(format!("{:04}_{:02}_{:02}.vmtile", map.0, gx, gy))
    }
}

impl TerrainSource for DirectoryTerrain {
    fn has_map_tile(&self, map: MapId, gx: u32, gy: u32) -> bool {
        self.map_tile_path(map, gx, gy).is_file()
    }

    fn has_vmap_tile(&self, map: MapId, gx: u32, gy: u32) -> bool {
        self.vmap_tile_path(map, gx, gy).is_file()
    }
}

/// All tile coordinates of `map` that have terrain geometry.
pub fn discover_grids(source: &dyn TerrainSource, map: MapId) -> BTreeSet<(u32, u32)> {
    let n = MAX_NUMBER_OF_GRIDS as u32;
    let mut grids = BTreeSet::new();
    for gx in 0..n {
        for gy in 0..n {
            if source.has_map_tile(map, gx, gy) {
                grids.insert((gx, gy));
            }
        }
    }
    grids
}

/// Whether both terrain and collision geometry exist under a world position.
pub fn exist_map_and_vmap(source: &dyn TerrainSource, map: MapId, x: f32, y: f32) -> bool {
    match GridCoord::from_world(x, y).to_tile() {
        Some((gx, gy)) => source.has_map_tile(map, gx, gy) && source.has_vmap_tile(map, gx, gy),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_origin_is_center_grid() {
        // Origin sits half a grid below the centre offset, rounding to 32.
        let coord = GridCoord::from_world(0.0, 0.0);
        assert_eq!(coord, GridCoord::new(32, 32));
        assert_eq!(coord.to_tile(), Some((31, 31)));
    }

    #[test]
    fn grid_steps_by_grid_size() {
        let half = (SIZE_OF_GRIDS / 2.0) as f32;
        let a = GridCoord::from_world(half, half);
        let b = GridCoord::from_world(3.0 * half, -half);
        assert_eq!(a, GridCoord::new(32, 32));
        assert_eq!(b.x, a.x + 1);
        assert_eq!(b.y, a.y - 1);
    }

    #[test]
    fn outside_the_map_has_no_tile() {
        assert_eq!(GridCoord::from_world(1.0e6, 0.0).to_tile(), None);
        assert_eq!(GridCoord::new(64, 0).to_tile(), None);
    }

    #[test]
    fn no_terrain_never_exists() {
        assert!(!exist_map_and_vmap(&NoTerrain, MapId(0), 0.0, 0.0));
        assert!(discover_grids(&NoTerrain, MapId(0)).is_empty());
    }

    #[test]
    fn directory_terrain_needs_both_tiles() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("maps")).unwrap();
        std::fs::create_dir_all(dir.path().join("vmaps")).unwrap();
        let terrain = DirectoryTerrain::new(dir.path());

        std::fs::write(terrain.map_tile_path(MapId(1), 31, 31), b"").unwrap();
        assert!(!exist_map_and_vmap(&terrain, MapId(1), 0.0, 0.0));

        std::fs::write(terrain.vmap_tile_path(MapId(1), 31, 31), b"").unwrap();
        assert!(exist_map_and_vmap(&terrain, MapId(1), 0.0, 0.0));
        assert!(!exist_map_and_vmap(&terrain, MapId(2), 0.0, 0.0));

        let grids = discover_grids(&terrain, MapId(1));
        assert_eq!(grids.len(), 1);
        assert!(grids.contains(&(31, 31)));
    }

    #[test]
    fn tile_file_names() {
        let terrain = DirectoryTerrain::new("/data");
        assert!(terrain
            .map_tile_path(MapId(571), 3, 12)
            .ends_with("maps/05710312.map"));
        assert!(terrain
            .vmap_tile_path(MapId(571), 3, 12)
            .ends_with("vmaps/0571_03_12.vmtile"));
    }
}
