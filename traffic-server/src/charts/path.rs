//! Smoothed line paths and their arc length, used for the draw-in animation.

use std::fmt;

use thiserror::Error;

/// Recursion cap for the arc-length integration.
const MAX_DEPTH: u32 = 30;
const TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CubicSegment {
    from: Point,
    ctrl1: Point,
    ctrl2: Point,
    to: Point,
}

impl CubicSegment {
    /// Eases horizontally: control points sit at one and two thirds of the
    /// x span, each at the height of its nearer endpoint.
    fn eased(from: Point, to: Point) -> Self {
        let dx = to.x - from.x;
        Self {
            from,
            ctrl1: Point::new(from.x + dx / 3.0, from.y),
            ctrl2: Point::new(to.x - dx / 3.0, to.y),
            to,
        }
    }

    fn speed(&self, t: f64) -> f64 {
        let u = 1.0 - t;
        let a = 3.0 * u * u;
        let b = 6.0 * u * t;
        let c = 3.0 * t * t;
        let dx = a * (self.ctrl1.x - self.from.x)
            + b * (self.ctrl2.x - self.ctrl1.x)
            + c * (self.to.x - self.ctrl2.x);
        let dy = a * (self.ctrl1.y - self.from.y)
            + b * (self.ctrl2.y - self.ctrl1.y)
            + c * (self.to.y - self.ctrl2.y);
        dx.hypot(dy)
    }

    fn length(&self) -> f64 {
        let speed = |t| self.speed(t);
        let (fa, fm, fb) = (speed(0.0), speed(0.5), speed(1.0));
        let whole = (fa + 4.0 * fm + fb) / 6.0;
        simpson(&speed, 0.0, 1.0, fa, fm, fb, whole, TOLERANCE, MAX_DEPTH)
    }
}

/// Adaptive Simpson quadrature over `[a, b]`.
#[allow(clippy::too_many_arguments)]
fn simpson(
    f: &impl Fn(f64) -> f64,
    a: f64,
    b: f64,
    fa: f64,
    fm: f64,
    fb: f64,
    whole: f64,
    eps: f64,
    depth: u32,
) -> f64 {
    let m = (a + b) / 2.0;
    let (lm, rm) = ((a + m) / 2.0, (m + b) / 2.0);
    let (flm, frm) = (f(lm), f(rm));
    let left = (m - a) / 6.0 * (fa + 4.0 * flm + fm);
    let right = (b - m) / 6.0 * (fm + 4.0 * frm + fb);
    let delta = left + right - whole;

    if depth == 0 || delta.abs() <= 15.0 * eps {
        return left + right + delta / 15.0;
    }
    simpson(f, a, m, fa, flm, fm, left, eps / 2.0, depth - 1)
        + simpson(f, m, b, fm, frm, fb, right, eps / 2.0, depth - 1)
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed path data near {0:?}")]
pub struct PathParseError(pub String);

/// A move-to followed by cubic Bézier segments. Its `Display` form is the
/// SVG `d` attribute.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SmoothPath {
    start: Option<Point>,
    segments: Vec<CubicSegment>,
}

impl SmoothPath {
    pub fn is_empty(&self) -> bool {
        self.start.is_none()
    }

    pub fn length(&self) -> f64 {
        // `sum` starts at -0.0, which would print as "-0".
        self.segments.iter().fold(0.0, |acc, s| acc + s.length())
    }

    /// Reads back the `M x,y C x,y x,y x,y ...` form that `Display` writes.
    pub fn parse(d: &str) -> Result<Self, PathParseError> {
        let mut tokens = d.split_whitespace();
        let Some(first) = tokens.next() else {
            return Ok(Self::default());
        };
        if first != "M" {
            return Err(PathParseError(first.to_owned()));
        }

        let mut cursor = parse_pair(tokens.next())?;
        let mut path = Self {
            start: Some(cursor),
            segments: Vec::new(),
        };

        while let Some(command) = tokens.next() {
            if command != "C" {
                return Err(PathParseError(command.to_owned()));
            }
            let ctrl1 = parse_pair(tokens.next())?;
            let ctrl2 = parse_pair(tokens.next())?;
            let to = parse_pair(tokens.next())?;
            path.segments.push(CubicSegment {
                from: cursor,
                ctrl1,
                ctrl2,
                to,
            });
            cursor = to;
        }

        Ok(path)
    }
}

fn parse_pair(token: Option<&str>) -> Result<Point, PathParseError> {
    let token = token.ok_or_else(|| PathParseError(String::new()))?;
    let malformed = || PathParseError(token.to_owned());
    let (x, y) = token.split_once(',').ok_or_else(malformed)?;
    Ok(Point::new(
        x.parse().map_err(|_| malformed())?,
        y.parse().map_err(|_| malformed())?,
    ))
}

impl fmt::Display for SmoothPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(start) = self.start else {
            return Ok(());
        };
        write!(f, "M {},{}", start.x, start.y)?;
        for s in &self.segments {
            write!(
                f,
                " C {},{} {},{} {},{}",
                s.ctrl1.x, s.ctrl1.y, s.ctrl2.x, s.ctrl2.y, s.to.x, s.to.y
            )?;
        }
        Ok(())
    }
}

pub fn build_smooth_path(points: &[Point]) -> SmoothPath {
    SmoothPath {
        start: points.first().copied(),
        segments: points
            .windows(2)
            .map(|pair| CubicSegment::eased(pair[0], pair[1]))
            .collect(),
    }
}

/// Arc length of a path description produced by [`build_smooth_path`].
pub fn path_length(d: &str) -> Result<f64, PathParseError> {
    Ok(SmoothPath::parse(d)?.length())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_empty_input() {
        let path = build_smooth_path(&[]);
        assert!(path.is_empty());
        assert_eq!(path.to_string(), "");
        assert_eq!(path_length("").unwrap(), 0.0);
        assert!(path.length().is_sign_positive());
    }

    #[test]
    fn test_single_point_is_move_only() {
        let path = build_smooth_path(&[Point::new(60.0, 320.0)]);
        assert_eq!(path.to_string(), "M 60,320");
        assert_eq!(path.length(), 0.0);
        assert!(path.length().is_sign_positive());
        assert_eq!(path.length().to_string(), "0");
    }

    #[test]
    fn test_control_points_at_thirds() {
        let path = build_smooth_path(&[Point::new(0.0, 10.0), Point::new(30.0, 40.0)]);
        assert_eq!(path.to_string(), "M 0,10 C 10,10 20,40 30,40");
    }

    #[test]
    fn test_flat_segment_length_is_span() {
        let path = build_smooth_path(&[Point::new(0.0, 5.0), Point::new(30.0, 5.0)]);
        assert!(approx(path.length(), 30.0));
    }

    #[test]
    fn test_sloped_segment_length_bounds() {
        let path = build_smooth_path(&[Point::new(0.0, 0.0), Point::new(30.0, 40.0)]);
        let length = path.length();
        assert!(length >= 50.0, "shorter than the chord: {length}");
        assert!(length <= 70.0, "longer than the control polygon bound: {length}");
    }

    #[test]
    fn test_length_grows_as_points_are_appended() {
        let ys = [300.0, 120.0, 120.0, 340.0, 60.0, 200.0];
        let mut points = Vec::new();
        let mut previous = 0.0;
        for (i, y) in ys.into_iter().enumerate() {
            points.push(Point::new(60.0 + i as f64 * 115.0, y));
            let length = build_smooth_path(&points).length();
            assert!(length >= previous);
            previous = length;
        }
    }

    #[test]
    fn test_parse_round_trips_description() {
        let points = [
            Point::new(60.0, 320.0),
            Point::new(183.33333333333334, 48.5),
            Point::new(306.6666666666667, 200.25),
        ];
        let path = build_smooth_path(&points);
        let parsed = SmoothPath::parse(&path.to_string()).unwrap();
        assert_eq!(parsed, path);
        assert_eq!(path_length(&path.to_string()).unwrap(), path.length());
    }

    #[test]
    fn test_parse_rejects_foreign_commands() {
        assert!(SmoothPath::parse("M 0,0 L 1,1").is_err());
        assert!(SmoothPath::parse("Q 0,0").is_err());
        assert!(SmoothPath::parse("M 0,0 C 1,1 2,2").is_err());
        assert!(SmoothPath::parse("M zero,0").is_err());
    }

    #[test]
    fn test_deterministic() {
        let points = [Point::new(0.0, 0.0), Point::new(10.0, 7.5), Point::new(20.0, 3.0)];
        assert_eq!(build_smooth_path(&points), build_smooth_path(&points));
        assert_eq!(
            build_smooth_path(&points).length(),
            build_smooth_path(&points).length()
        );
    }
}
