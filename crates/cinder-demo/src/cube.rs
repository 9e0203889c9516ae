use cinder_engine::render::Vertex;
use glam::Vec3;

/// (normal, u axis, v axis) per face, with `u x v == normal` so corners listed
/// (-,-) (+,-) (+,+) (-,+) wind counter-clockwise seen from outside.
const FACES: [(Vec3, Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Z, Vec3::Y),
    (Vec3::NEG_X, Vec3::Z, Vec3::Y),
    (Vec3::Y, Vec3::X, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    (Vec3::Z, Vec3::X, Vec3::Y),
    (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
];

/// Unit cube centered on the origin: 24 vertices (4 per face, so every face
/// gets its own normal and full texture) and 36 indices.
pub fn unit_cube() -> (Vec<Vertex>, Vec<u16>) {
    let corners = [(-0.5, -0.5, [0.0, 1.0]), (0.5, -0.5, [1.0, 1.0]), (0.5, 0.5, [1.0, 0.0]), (-0.5, 0.5, [0.0, 0.0])];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in FACES {
        let base = vertices.len() as u16;
        for (su, sv, uv) in corners {
            let position = normal * 0.5 + u * su + v * sv;
            vertices.push(Vertex {
                position: position.to_array(),
                normal: normal.to_array(),
                uv,
            });
        }
        indices.extend([0, 1, 2, 2, 3, 0].map(|i| base + i));
    }
    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        let (vertices, indices) = unit_cube();
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
        assert!(indices.iter().all(|i| (*i as usize) < vertices.len()));
    }

    #[test]
    fn triangles_face_outward() {
        let (vertices, indices) = unit_cube();
        for tri in indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from(vertices[i as usize].position));
            let normal = Vec3::from(vertices[tri[0] as usize].normal);
            let winding = (b - a).cross(c - a);
            assert!(winding.dot(normal) > 0.0, "triangle {tri:?} winds clockwise");
            // Every vertex sits on the face plane.
            assert!((a.dot(normal) - 0.5).abs() < 1e-6);
        }
    }
}
