//! The periodic 3-D voxel grid substrate and its text image I/O.

use crate::error::GridError;
use crate::phase::{self, PhaseId};
use std::io::{BufRead, Write};

/// Wraps `i` into `[0, n)`, the modular indexing rule every engine relies on
/// for periodic neighbor access.
#[inline]
pub fn wrap(i: i64, n: i64) -> i64 {
    ((i % n) + n) % n
}

/// A finite periodic 3-D array of `T`, dimensions `(nx, ny, nz)`, isotropic
/// voxel resolution `resolution_um` (micrometers/voxel). Storage order is
/// z-outermost, then y, then x (`index = (z*ny + y)*nx + x`), matching the
/// image file's on-disk order so a freshly loaded grid needs no reshuffling.
#[derive(Clone, Debug)]
pub struct Grid<T> {
    nx: i64,
    ny: i64,
    nz: i64,
    resolution_um: f64,
    voxels: Vec<T>,
}

/// Phase-id grid: the canonical microstructure.
pub type PhaseGrid = Grid<PhaseId>;
/// Particle-id grid: parallel to a [`PhaseGrid`], `0` for non-particle voxels.
pub type PartIdGrid = Grid<u32>;

impl<T: Copy + Default> Grid<T> {
    /// Builds a new grid of the given dimensions, every voxel set to `T::default()`.
    pub fn new(nx: i64, ny: i64, nz: i64, resolution_um: f64) -> Result<Self, GridError> {
        let count = checked_voxel_count(nx, ny, nz)?;
        Ok(Self {
            nx,
            ny,
            nz,
            resolution_um,
            voxels: vec![T::default(); count],
        })
    }
}

impl<T: Copy> Grid<T> {
    /// Builds a new grid of the given dimensions, every voxel set to `value`.
    pub fn filled(nx: i64, ny: i64, nz: i64, resolution_um: f64, value: T) -> Self {
        let count = checked_voxel_count(nx, ny, nz).expect("dimensions fit in usize");
        Self {
            nx,
            ny,
            nz,
            resolution_um,
            voxels: vec![value; count],
        }
    }

    /// Inverse of [`Grid::flat_index`]: the `(x, y, z)` coordinate of a flat
    /// voxel index, in z-outermost storage order.
    pub fn unflatten(&self, flat: usize) -> (i64, i64, i64) {
        let plane = (self.nx * self.ny) as usize;
        let z = (flat / plane) as i64;
        let rest = (flat % plane) as i64;
        let y = rest / self.nx;
        let x = rest % self.nx;
        (x, y, z)
    }

    #[inline]
    pub fn get_flat(&self, flat: usize) -> T {
        self.voxels[flat]
    }

    #[inline]
    pub fn set_flat(&mut self, flat: usize, value: T) {
        self.voxels[flat] = value;
    }
}

impl<T: Copy> Grid<T> {
    #[inline]
    pub fn nx(&self) -> i64 {
        self.nx
    }
    #[inline]
    pub fn ny(&self) -> i64 {
        self.ny
    }
    #[inline]
    pub fn nz(&self) -> i64 {
        self.nz
    }
    #[inline]
    pub fn resolution_um(&self) -> f64 {
        self.resolution_um
    }
    #[inline]
    pub fn voxel_count(&self) -> usize {
        self.voxels.len()
    }

    #[inline]
    pub fn flat_index(&self, x: i64, y: i64, z: i64) -> usize {
        let x = wrap(x, self.nx);
        let y = wrap(y, self.ny);
        let z = wrap(z, self.nz);
        ((z * self.ny + y) * self.nx + x) as usize
    }

    /// Non-wrapping flat index; caller guarantees `0 <= x < nx` etc. Used by
    /// the image reader/writer where coordinates are already in range.
    #[inline]
    fn flat_index_unchecked(&self, x: i64, y: i64, z: i64) -> usize {
        ((z * self.ny + y) * self.nx + x) as usize
    }

    #[inline]
    pub fn get(&self, x: i64, y: i64, z: i64) -> T {
        self.voxels[self.flat_index(x, y, z)]
    }

    #[inline]
    pub fn set(&mut self, x: i64, y: i64, z: i64, value: T) {
        let idx = self.flat_index(x, y, z);
        self.voxels[idx] = value;
    }

    pub fn voxels(&self) -> &[T] {
        &self.voxels
    }

    pub fn voxels_mut(&mut self) -> &mut [T] {
        &mut self.voxels
    }

    /// Iterates over every `(x, y, z)` coordinate in z-outermost order,
    /// matching on-disk layout.
    pub fn coords(&self) -> impl Iterator<Item = (i64, i64, i64)> + '_ {
        let (nx, ny, nz) = (self.nx, self.ny, self.nz);
        (0..nz).flat_map(move |z| (0..ny).flat_map(move |y| (0..nx).map(move |x| (x, y, z))))
    }
}

fn checked_voxel_count(nx: i64, ny: i64, nz: i64) -> Result<usize, GridError> {
    let count = (nx as i128) * (ny as i128) * (nz as i128);
    if nx <= 0 || ny <= 0 || nz <= 0 || count > usize::MAX as i128 {
        return Err(GridError::DimensionOverflow { nx, ny, nz });
    }
    Ok(count as usize)
}

/// The 6 face-adjacent, 18 face+edge-adjacent, and 26 face+edge+corner
/// offsets used across engines.
pub mod neighborhood {
    pub const OFFSETS_6: [(i64, i64, i64); 6] = [
        (1, 0, 0),
        (-1, 0, 0),
        (0, 1, 0),
        (0, -1, 0),
        (0, 0, 1),
        (0, 0, -1),
    ];

    pub const OFFSETS_18: [(i64, i64, i64); 18] = [
        (1, 0, 0), (-1, 0, 0), (0, 1, 0), (0, -1, 0), (0, 0, 1), (0, 0, -1),
        (1, 1, 0), (1, -1, 0), (-1, 1, 0), (-1, -1, 0),
        (1, 0, 1), (1, 0, -1), (-1, 0, 1), (-1, 0, -1),
        (0, 1, 1), (0, 1, -1), (0, -1, 1), (0, -1, -1),
    ];

    pub const OFFSETS_26: [(i64, i64, i64); 26] = [
        (1, 0, 0), (-1, 0, 0), (0, 1, 0), (0, -1, 0), (0, 0, 1), (0, 0, -1),
        (1, 1, 0), (1, -1, 0), (-1, 1, 0), (-1, -1, 0),
        (1, 0, 1), (1, 0, -1), (-1, 0, 1), (-1, 0, -1),
        (0, 1, 1), (0, 1, -1), (0, -1, 1), (0, -1, -1),
        (1, 1, 1), (1, 1, -1), (1, -1, 1), (1, -1, -1),
        (-1, 1, 1), (-1, 1, -1), (-1, -1, 1), (-1, -1, -1),
    ];
}

impl<T: Copy> Grid<T> {
    /// The 6 periodic face-neighbor values of `(x,y,z)`.
    pub fn neighbors_6(&self, x: i64, y: i64, z: i64) -> [T; 6] {
        let mut out = [self.get(x, y, z); 6];
        for (i, (dx, dy, dz)) in neighborhood::OFFSETS_6.iter().enumerate() {
            out[i] = self.get(x + dx, y + dy, z + dz);
        }
        out
    }

    /// The 18 periodic face+edge-neighbor values of `(x,y,z)`.
    pub fn neighbors_18(&self, x: i64, y: i64, z: i64) -> [T; 18] {
        let mut out = [self.get(x, y, z); 18];
        for (i, (dx, dy, dz)) in neighborhood::OFFSETS_18.iter().enumerate() {
            out[i] = self.get(x + dx, y + dy, z + dz);
        }
        out
    }

    /// The 26 periodic face+edge+corner-neighbor values of `(x,y,z)`.
    pub fn neighbors_26(&self, x: i64, y: i64, z: i64) -> [T; 26] {
        let mut out = [self.get(x, y, z); 26];
        for (i, (dx, dy, dz)) in neighborhood::OFFSETS_26.iter().enumerate() {
            out[i] = self.get(x + dx, y + dy, z + dz);
        }
        out
    }
}

/// Parsed image header, before the voxel block is consumed.
#[derive(Clone, Debug)]
struct ImageHeader {
    version: String,
    nx: i64,
    ny: i64,
    nz: i64,
    resolution_um: f64,
}

impl Default for ImageHeader {
    fn default() -> Self {
        Self {
            version: "2.0".to_string(),
            nx: 100,
            ny: 100,
            nz: 100,
            resolution_um: 1.0,
        }
    }
}

/// Reads a text image: an optional `Key: value` header followed by
/// `nx*ny*nz` whitespace-separated integer phase ids in z-outermost order.
/// Every id is passed through [`phase::remap`].
///
/// If no recognized header key is present at all, the defaults of
/// [`ImageHeader::default`] are used and the entire input is treated as the
/// voxel block.
pub fn read_phase_grid<R: BufRead>(reader: R) -> Result<PhaseGrid, GridError> {
    let mut lines = reader.lines();
    let mut header = ImageHeader::default();
    let mut header_started = false;
    let mut seen_version = false;
    let mut seen_x = false;
    let mut seen_y = false;
    let mut seen_z = false;
    let mut seen_resolution = false;
    let mut pending_tokens: Vec<String> = Vec::new();

    while let Some(line) = lines.next() {
        let line = line.map_err(|_| GridError::ParseFailure {
            token: "<io error>".to_string(),
            index: 0,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some((key, value)) = trimmed.split_once(':') {
            let key = key.trim();
            let value = value.trim();
            match key {
                "Version" => {
                    header.version = value.to_string();
                    header_started = true;
                    seen_version = true;
                }
                "X_Size" => {
                    header.nx = parse_i64(value)?;
                    header_started = true;
                    seen_x = true;
                }
                "Y_Size" => {
                    header.ny = parse_i64(value)?;
                    header_started = true;
                    seen_y = true;
                }
                "Z_Size" => {
                    header.nz = parse_i64(value)?;
                    header_started = true;
                    seen_z = true;
                }
                "Image_Resolution" => {
                    header.resolution_um = parse_f64(value)?;
                    header_started = true;
                    seen_resolution = true;
                }
                _ => {
                    // Not a recognized header key: this line is the start of
                    // the voxel block, fall through to token collection below.
                    pending_tokens.extend(trimmed.split_whitespace().map(|s| s.to_string()));
                    break;
                }
            }
        } else {
            // First non-"Key: value" line: the voxel block has begun.
            pending_tokens.extend(trimmed.split_whitespace().map(|s| s.to_string()));
            break;
        }
    }

    if !header_started {
        // No header at all: defaults apply and everything collected so far,
        // plus the rest of the stream, is the raw voxel block.
        header = ImageHeader::default();
    } else if !(seen_version && seen_x && seen_y && seen_z && seen_resolution) {
        let missing = [
            (seen_version, "Version"),
            (seen_x, "X_Size"),
            (seen_y, "Y_Size"),
            (seen_z, "Z_Size"),
            (seen_resolution, "Image_Resolution"),
        ]
        .into_iter()
        .find(|(seen, _)| !seen)
        .map(|(_, key)| key)
        .unwrap();
        return Err(GridError::MissingHeaderKey(missing));
    }

    for line in lines {
        let line = line.map_err(|_| GridError::ParseFailure {
            token: "<io error>".to_string(),
            index: pending_tokens.len(),
        })?;
        pending_tokens.extend(line.trim().split_whitespace().map(|s| s.to_string()));
    }

    let expected = checked_voxel_count(header.nx, header.ny, header.nz)?;
    if pending_tokens.len() < expected {
        return Err(GridError::TooFewValues {
            expected,
            found: pending_tokens.len(),
        });
    }

    let mut grid = Grid::<PhaseId>::new(header.nx, header.ny, header.nz, header.resolution_um)?;
    for (index, token) in pending_tokens.iter().take(expected).enumerate() {
        let raw: u16 = token.parse().map_err(|_| GridError::ParseFailure {
            token: token.clone(),
            index,
        })?;
        let remapped = phase::remap(raw as u8, &header.version);
        if (remapped as usize) >= phase::phase_table().len() {
            return Err(GridError::OutOfRangePhaseId(remapped));
        }
        let (z, rest) = (index as i64 / (header.nx * header.ny), index as i64 % (header.nx * header.ny));
        let (y, x) = (rest / header.nx, rest % header.nx);
        let idx = grid.flat_index_unchecked(x, y, z);
        grid.voxels[idx] = PhaseId(remapped);
    }

    Ok(grid)
}

/// Current on-disk version string; writers always emit a header, always at
/// this version.
pub const CURRENT_VERSION: &str = "current";

/// Writes a text image with a header at [`CURRENT_VERSION`].
pub fn write_phase_grid<W: Write>(mut writer: W, grid: &PhaseGrid) -> std::io::Result<()> {
    writeln!(writer, "Version: {}", CURRENT_VERSION)?;
    writeln!(writer, "X_Size: {}", grid.nx())?;
    writeln!(writer, "Y_Size: {}", grid.ny())?;
    writeln!(writer, "Z_Size: {}", grid.nz())?;
    writeln!(writer, "Image_Resolution: {}", grid.resolution_um())?;
    write_voxel_block(writer, grid.voxels().iter().map(|p| p.0 as i64), grid.nx())
}

/// Writes a particle-id image with the same header shape.
pub fn write_partid_grid<W: Write>(mut writer: W, grid: &PartIdGrid) -> std::io::Result<()> {
    writeln!(writer, "Version: {}", CURRENT_VERSION)?;
    writeln!(writer, "X_Size: {}", grid.nx())?;
    writeln!(writer, "Y_Size: {}", grid.ny())?;
    writeln!(writer, "Z_Size: {}", grid.nz())?;
    writeln!(writer, "Image_Resolution: {}", grid.resolution_um())?;
    write_voxel_block(writer, grid.voxels().iter().map(|p| *p as i64), grid.nx())
}

fn write_voxel_block<W: Write>(
    mut writer: W,
    values: impl Iterator<Item = i64>,
    nx: i64,
) -> std::io::Result<()> {
    for (i, v) in values.enumerate() {
        if i as i64 % nx == 0 {
            if i != 0 {
                writeln!(writer)?;
            }
        } else {
            write!(writer, " ")?;
        }
        write!(writer, "{}", v)?;
    }
    writeln!(writer)
}

fn parse_i64(value: &str) -> Result<i64, GridError> {
    value.parse().map_err(|_| GridError::ParseFailure {
        token: value.to_string(),
        index: 0,
    })
}

fn parse_f64(value: &str) -> Result<f64, GridError> {
    value.parse().map_err(|_| GridError::ParseFailure {
        token: value.to_string(),
        index: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn wrap_is_total_and_idempotent() {
        for n in [1i64, 7, 50] {
            for i in -200..200 {
                let w = wrap(i, n);
                assert!((0..n).contains(&w));
                assert_eq!(wrap(w, n), w);
            }
        }
    }

    #[test]
    fn round_trip_with_header() {
        let mut grid = PhaseGrid::new(4, 3, 2, 1.5).unwrap();
        for (i, (x, y, z)) in grid.coords().collect::<Vec<_>>().into_iter().enumerate() {
            grid.set(x, y, z, PhaseId((i % 5) as u8));
        }

        let mut buf = Vec::new();
        write_phase_grid(&mut buf, &grid).unwrap();
        let read_back = read_phase_grid(Cursor::new(buf)).unwrap();

        assert_eq!(read_back.nx(), grid.nx());
        assert_eq!(read_back.ny(), grid.ny());
        assert_eq!(read_back.nz(), grid.nz());
        assert_eq!(read_back.voxels(), grid.voxels());
    }

    #[test]
    fn missing_header_uses_defaults() {
        let values: Vec<String> = (0..(100 * 100 * 100)).map(|_| "0".to_string()).collect();
        let text = values.join(" ");
        let grid = read_phase_grid(Cursor::new(text)).unwrap();
        assert_eq!((grid.nx(), grid.ny(), grid.nz()), (100, 100, 100));
        assert_eq!(grid.resolution_um(), 1.0);
    }

    #[test]
    fn too_few_values_is_fatal() {
        let mut text = String::from("Version: current\nX_Size: 2\nY_Size: 2\nZ_Size: 2\nImage_Resolution: 1.0\n");
        text.push_str("0 0 0\n");
        let result = read_phase_grid(Cursor::new(text));
        assert!(matches!(result, Err(GridError::TooFewValues { .. })));
    }

    #[test]
    fn periodic_neighbors_wrap() {
        let mut grid = PhaseGrid::new(3, 3, 3, 1.0).unwrap();
        grid.set(0, 1, 1, PhaseId::AGG);
        // (-1,1,1) wraps to (2,1,1), not (0,1,1); check the opposite corner instead.
        grid.set(2, 1, 1, PhaseId::CSH);
        let neighbors = grid.neighbors_6(0, 1, 1);
        assert_eq!(neighbors[1], PhaseId::CSH); // (-1,0,0) wraps to x=2
    }
}
