/// A point in RGB space, components in `0.0..=255.0`.
pub type Vec3 = [f64; 3];

/// Axis returned when the points carry no direction at all.
const GRAY_AXIS: Vec3 = [
    0.577_350_269_189_625_8,
    0.577_350_269_189_625_8,
    0.577_350_269_189_625_8,
];

const POWER_ITERATIONS: usize = 24;
const EPSILON: f64 = 1e-9;

fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn length(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

fn scale(a: Vec3, s: f64) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

/// Least-squares line through `points` as `(mean, unit axis)`.
///
/// The axis is the dominant eigenvector of the points' covariance matrix,
/// found by power iteration. Its sign is arbitrary.
pub fn line_fit(points: &[Vec3]) -> (Vec3, Vec3) {
    if points.is_empty() {
        return ([0.0; 3], GRAY_AXIS);
    }
    let n = points.len() as f64;
    let mut mean = [0.0; 3];
    for p in points {
        for c in 0..3 {
            mean[c] += p[c] / n;
        }
    }

    let mut covariance = [[0.0; 3]; 3];
    for p in points {
        let d = [p[0] - mean[0], p[1] - mean[1], p[2] - mean[2]];
        for i in 0..3 {
            for j in 0..3 {
                covariance[i][j] += d[i] * d[j];
            }
        }
    }

    // Seed with the widest covariance column.
    let mut axis = covariance
        .iter()
        .copied()
        .max_by(|a, b| length(*a).total_cmp(&length(*b)))
        .unwrap_or(GRAY_AXIS);
    let seed_length = length(axis);
    if seed_length < EPSILON {
        return (mean, GRAY_AXIS);
    }
    axis = scale(axis, 1.0 / seed_length);

    for _ in 0..POWER_ITERATIONS {
        let next = [
            dot(covariance[0], axis),
            dot(covariance[1], axis),
            dot(covariance[2], axis),
        ];
        let len = length(next);
        if len < EPSILON {
            break;
        }
        axis = scale(next, 1.0 / len);
    }
    (mean, axis)
}

/// Signed distance of `point` along `axis`.
pub fn project(point: Vec3, axis: Vec3) -> f64 {
    dot(point, axis)
}
