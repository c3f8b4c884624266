//! Projectable constraint sets
//!
//! A set usable by the inner solvers only has to support an O(n) Euclidean
//! projection. The decision variable lives in one such set, and the image of
//! the general constraint function in another.

use ndarray::prelude::*;
use ndarray::Zip;

/// A closed set admitting a cheap Euclidean projection.
pub trait Constraint {
    /// Project `x` onto the set, in place.
    fn project(&self, x: ArrayViewMut1<f64>);
}

/// The whole space; projection is the identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConstraints;

impl Constraint for NoConstraints {
    #[inline]
    fn project(&self, _x: ArrayViewMut1<f64>) {}
}

/// A rectangle (box) with optional lower and upper bounds.
///
/// Projection clamps each component to its bounds, so components already
/// inside the box are returned bit-identical.
#[derive(Debug, Clone)]
pub struct Rectangle {
    lower: Option<Array1<f64>>,
    upper: Option<Array1<f64>>,
}

impl Rectangle {
    pub fn new(lower: Option<Array1<f64>>, upper: Option<Array1<f64>>) -> Rectangle {
        if let (Some(lo), Some(hi)) = (&lower, &upper) {
            assert_eq!(lo.len(), hi.len(), "bound vectors must have equal length");
        }
        Rectangle { lower, upper }
    }
}

impl Constraint for Rectangle {
    fn project(&self, mut x: ArrayViewMut1<f64>) {
        if let Some(lo) = &self.lower {
            Zip::from(&mut x).and(lo).for_each(|xi, &l| {
                if *xi < l {
                    *xi = l;
                }
            });
        }
        if let Some(hi) = &self.upper {
            Zip::from(&mut x).and(hi).for_each(|xi, &h| {
                if *xi > h {
                    *xi = h;
                }
            });
        }
    }
}

/// A Euclidean ball of radius `r`, optionally centered away from the origin.
#[derive(Debug, Clone)]
pub struct Ball2 {
    center: Option<Array1<f64>>,
    radius: f64,
}

impl Ball2 {
    pub fn new(center: Option<Array1<f64>>, radius: f64) -> Ball2 {
        assert!(radius > 0.0, "radius must be positive");
        Ball2 { center, radius }
    }
}

impl Constraint for Ball2 {
    fn project(&self, mut x: ArrayViewMut1<f64>) {
        match &self.center {
            None => {
                let norm = x.dot(&x).sqrt();
                if norm > self.radius {
                    let scale = self.radius / norm;
                    x.mapv_inplace(|v| v * scale);
                }
            }
            Some(c) => {
                let mut dist_sq = 0.0;
                Zip::from(&x).and(c).for_each(|&xi, &ci| {
                    dist_sq += (xi - ci) * (xi - ci);
                });
                let dist = dist_sq.sqrt();
                if dist > self.radius {
                    let scale = self.radius / dist;
                    Zip::from(&mut x).and(c).for_each(|xi, &ci| {
                        *xi = ci + scale * (*xi - ci);
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn no_constraints_is_identity() {
        let mut x = array![3.0, -7.5];
        NoConstraints.project(x.view_mut());
        assert_eq!(x, array![3.0, -7.5]);
    }

    #[test]
    fn rectangle_clamps_exactly() {
        let rect = Rectangle::new(Some(array![0.0, 0.0, 0.0]), Some(array![1.0, 1.0, 1.0]));
        let mut x = array![-0.5, 0.5, 1.5];
        rect.project(x.view_mut());
        // interior components come back bit-identical, the rest sit on a bound
        assert_eq!(x, array![0.0, 0.5, 1.0]);
    }

    #[test]
    fn rectangle_one_sided() {
        let rect = Rectangle::new(Some(array![-1.0, -1.0]), None);
        let mut x = array![-3.0, 5.0];
        rect.project(x.view_mut());
        assert_eq!(x, array![-1.0, 5.0]);
    }

    #[test]
    fn ball_projects_onto_sphere() {
        let ball = Ball2::new(None, 1.0);
        let mut x = array![3.0, 4.0];
        ball.project(x.view_mut());
        assert_abs_diff_eq!(x, array![0.6, 0.8], epsilon = 1e-15);

        let mut inside = array![0.1, -0.2];
        ball.project(inside.view_mut());
        assert_eq!(inside, array![0.1, -0.2]);
    }

    #[test]
    fn ball_with_center() {
        let ball = Ball2::new(Some(array![1.0, 1.0]), 2.0);
        let mut x = array![1.0, 5.0];
        ball.project(x.view_mut());
        assert_abs_diff_eq!(x, array![1.0, 3.0], epsilon = 1e-15);
    }
}
