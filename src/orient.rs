use std::collections::VecDeque;

use ahash::AHashMap;

use crate::grid::VoxelGrid;
use crate::surface_nets::Extraction;

/// Triangles with squared area at or below this (grid units) are dropped.
const DEGENERATE_AREA_SQ: f32 = 1e-10;

/// Distance along the seed normal at which the inside field is probed.
const PROBE_OFFSET: f32 = 0.25;

/// First winding pass: flip each stitched quad pair whose geometric normal
/// disagrees with the field gradient sampled at the quad centroid.
pub(crate) fn orient_quads(grid: &VoxelGrid, ext: &mut Extraction) {
    let verts = &ext.vertices;
    for quad in ext.indices.chunks_exact_mut(6) {
        let a = verts[quad[0] as usize];
        let b = verts[quad[1] as usize];
        let c = verts[quad[2] as usize];
        let d = verts[quad[5] as usize];

        let normal = (b - a).cross(c - a);
        let centroid = (a + b + c + d) / 4.0;
        let outward = -grid.inside_gradient(centroid);
        if normal.dot(outward) < 0.0 {
            quad.swap(1, 2);
            quad.swap(4, 5);
        }
    }
}

/// Drops triangles with repeated indices or vanishing area.
pub(crate) fn drop_degenerate(ext: &mut Extraction) {
    let verts = &ext.vertices;
    let mut kept = Vec::with_capacity(ext.indices.len());
    for tri in ext.indices.chunks_exact(3) {
        let [a, b, c] = [tri[0], tri[1], tri[2]];
        if a == b || b == c || a == c {
            continue;
        }
        let pa = verts[a as usize];
        let pb = verts[b as usize];
        let pc = verts[c as usize];
        if (pb - pa).cross(pc - pa).length_squared() <= DEGENERATE_AREA_SQ {
            continue;
        }
        kept.extend_from_slice(&[a, b, c]);
    }
    let dropped = (ext.indices.len() - kept.len()) / 3;
    if dropped > 0 {
        log::debug!("dropped {dropped} degenerate triangles");
    }
    ext.indices = kept;
}

/// Final winding pass: walk each connected component over shared edges,
/// flipping triangles until neighbors traverse every shared edge in opposite
/// directions, then decide the whole component's orientation with a single
/// inside/outside probe at the seed triangle. Returns the component count.
pub(crate) fn orient_components(grid: &VoxelGrid, ext: &mut Extraction) -> usize {
    let triangle_count = ext.indices.len() / 3;
    if triangle_count == 0 {
        return 0;
    }

    // Undirected edge -> (triangle, stored direction) adjacency.
    let mut adjacency: AHashMap<(u32, u32), Vec<(u32, bool)>> = AHashMap::new();
    for t in 0..triangle_count {
        for (u, v) in triangle_edges(&ext.indices, t) {
            let key = (u.min(v), u.max(v));
            adjacency.entry(key).or_default().push((t as u32, u < v));
        }
    }

    let mut visited = vec![false; triangle_count];
    let mut flip = vec![false; triangle_count];
    let mut queue = VecDeque::new();
    let mut components = 0usize;

    for seed in 0..triangle_count {
        if visited[seed] {
            continue;
        }
        components += 1;
        visited[seed] = true;
        let mut member_of = vec![seed];
        queue.push_back(seed);

        while let Some(t) = queue.pop_front() {
            for (u, v) in triangle_edges(&ext.indices, t) {
                let key = (u.min(v), u.max(v));
                // Effective direction of this edge after the flip chosen for t.
                let forward = (u < v) != flip[t];
                for &(other, other_forward) in &adjacency[&key] {
                    let other = other as usize;
                    if other == t || visited[other] {
                        continue;
                    }
                    visited[other] = true;
                    // Consistent neighbors traverse the shared edge in
                    // opposite effective directions.
                    flip[other] = other_forward == forward;
                    member_of.push(other);
                    queue.push_back(other);
                }
            }
        }

        if seed_points_inward(grid, ext, seed, flip[seed]) {
            for &t in &member_of {
                flip[t] = !flip[t];
            }
        }
    }

    for (t, &f) in flip.iter().enumerate() {
        if f {
            ext.indices.swap(3 * t + 1, 3 * t + 2);
        }
    }

    log::debug!("{components} connected components oriented");
    components
}

fn triangle_edges(indices: &[u32], t: usize) -> [(u32, u32); 3] {
    let a = indices[3 * t];
    let b = indices[3 * t + 1];
    let c = indices[3 * t + 2];
    [(a, b), (b, c), (c, a)]
}

/// Probes the inside field on both sides of the seed triangle. True when the
/// seed's effective normal points toward the inside.
fn seed_points_inward(grid: &VoxelGrid, ext: &Extraction, seed: usize, flipped: bool) -> bool {
    let a = ext.vertices[ext.indices[3 * seed] as usize];
    let mut b = ext.vertices[ext.indices[3 * seed + 1] as usize];
    let mut c = ext.vertices[ext.indices[3 * seed + 2] as usize];
    if flipped {
        std::mem::swap(&mut b, &mut c);
    }

    // Degenerate triangles were filtered, so the normal is well-defined.
    let normal = (b - a).cross(c - a).normalize();
    let centroid = (a + b + c) / 3.0;

    let ahead = grid.sample_inside(centroid + PROBE_OFFSET * normal);
    let behind = grid.sample_inside(centroid - PROBE_OFFSET * normal);
    match (ahead >= 0.5, behind >= 0.5) {
        (true, false) => true,
        (false, true) => false,
        // Both probes landed on the same side of the iso-threshold; fall
        // back to the field slope.
        _ => ahead > behind,
    }
}
