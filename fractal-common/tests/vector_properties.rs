use fractal_common::Vector2D;
use proptest::prelude::*;

const EPS: f64 = 1e-6;

proptest! {
    #[test]
    fn rotate_then_unrotate_is_identity(
        x in -1.0e3f64..1.0e3,
        y in -1.0e3f64..1.0e3,
        theta in -720.0f64..720.0,
    ) {
        let mut v = Vector2D::new(x, y);
        v.rotate(theta).rotate(-theta);
        prop_assert!((v.x - x).abs() < EPS, "x drifted: {} vs {}", v.x, x);
        prop_assert!((v.y - y).abs() < EPS, "y drifted: {} vs {}", v.y, y);
    }

    #[test]
    fn rotation_preserves_length(x in -1.0e3f64..1.0e3, y in -1.0e3f64..1.0e3, theta in -360.0f64..360.0) {
        let mut v = Vector2D::new(x, y);
        let before = v.length();
        v.rotate(theta);
        prop_assert!((v.length() - before).abs() < EPS);
    }

    #[test]
    fn set_length_keeps_direction(
        x in -1.0e3f64..1.0e3,
        y in -1.0e3f64..1.0e3,
        target in 1.0e-3f64..1.0e4,
    ) {
        let original = Vector2D::new(x, y);
        prop_assume!(original.length() > 1.0e-3);

        let mut v = original.clone();
        v.set_length(target).unwrap();
        prop_assert!((v.length() - target).abs() < EPS * target.max(1.0));

        let mut before = original.clone();
        before.normalize().unwrap();
        let mut after = v.clone();
        after.normalize().unwrap();
        prop_assert!((before.x - after.x).abs() < EPS);
        prop_assert!((before.y - after.y).abs() < EPS);
    }
}
