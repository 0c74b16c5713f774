//! Edge table connecting landmark indices for mesh drawing.
//!
//! The face-mesh tessellation is the edge set of the canonical face model's
//! triangles. It can be built from triangles directly or parsed from the
//! canonical model's Wavefront OBJ file.

use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("failed to read mesh topology: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed face on line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct MeshTopology {
    /// Undirected edges stored as `(low, high)`, in first-seen order.
    edges: Vec<(usize, usize)>,
}

impl MeshTopology {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Collects every triangle side once, regardless of winding.
    pub fn from_triangles(triangles: &[[usize; 3]]) -> Self {
        let mut seen = HashSet::new();
        let mut edges = Vec::with_capacity(triangles.len() * 3 / 2);
        for &[a, b, c] in triangles {
            for (u, v) in [(a, b), (b, c), (c, a)] {
                if u == v {
                    continue;
                }
                let edge = (u.min(v), u.max(v));
                if seen.insert(edge) {
                    edges.push(edge);
                }
            }
        }
        Self { edges }
    }

    pub fn from_obj_file(path: &Path) -> Result<Self, TopologyError> {
        let file = std::fs::File::open(path)?;
        Self::from_obj(std::io::BufReader::new(file))
    }

    /// Parses the `f` lines of an OBJ file. Vertex references may carry
    /// `/vt/vn` suffixes; indices are 1-based in the file and 0-based here.
    /// Polygons with more than three vertices are fan-triangulated.
    pub fn from_obj<R: BufRead>(reader: R) -> Result<Self, TopologyError> {
        let mut triangles = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let mut parts = line.split_whitespace();
            if parts.next() != Some("f") {
                continue;
            }
            let line_no = i + 1;
            let vertices = parts
                .map(|token| parse_vertex_ref(token, line_no))
                .collect::<Result<Vec<_>, _>>()?;
            if vertices.len() < 3 {
                return Err(TopologyError::Parse {
                    line: line_no,
                    reason: format!("expected at least 3 vertices, got {}", vertices.len()),
                });
            }
            for k in 1..vertices.len() - 1 {
                triangles.push([vertices[0], vertices[k], vertices[k + 1]]);
            }
        }
        Ok(Self::from_triangles(&triangles))
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Highest landmark index referenced, if any edge exists.
    pub fn max_index(&self) -> Option<usize> {
        self.edges.iter().map(|&(_, hi)| hi).max()
    }
}

fn parse_vertex_ref(token: &str, line: usize) -> Result<usize, TopologyError> {
    let index_part = token.split('/').next().unwrap_or_default();
    let index: usize = index_part.parse().map_err(|_| TopologyError::Parse {
        line,
        reason: format!("invalid vertex reference '{token}'"),
    })?;
    if index == 0 {
        return Err(TopologyError::Parse {
            line,
            reason: "vertex indices are 1-based".to_string(),
        });
    }
    Ok(index - 1)
}
