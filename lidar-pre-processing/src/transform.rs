/// Parser for `-transform` arguments such as
/// `translate (100, 0, 0) * rotate (0, 0, 1), 90 * scale 2`.
use glam::{DAffine3, DQuat, DVec3};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("malformed transformation \"{text}\": {reason}")]
pub struct TransformError {
    text: String,
    reason: String,
}

impl TransformError {
    fn new(text: &str, reason: impl Into<String>) -> Self {
        Self {
            text: text.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parse a product of `identity`, `translate`, `rotate` and uniform `scale` factors.
///
/// Factors compose left to right, so the rightmost one is applied to a point first.
pub fn parse_transform(text: &str) -> Result<DAffine3, TransformError> {
    let mut result = DAffine3::IDENTITY;
    for factor in text.split('*') {
        let factor = factor.trim();
        let (keyword, rest) = factor
            .split_once(|c: char| c.is_whitespace() || c == '(')
            .map(|(k, _)| (k, factor[k.len()..].trim()))
            .unwrap_or((factor, ""));
        let component = match keyword.to_ascii_lowercase().as_str() {
            "identity" if rest.is_empty() => DAffine3::IDENTITY,
            "translate" => DAffine3::from_translation(parse_vector(text, rest)?),
            "rotate" => {
                let (axis, angle) = rest
                    .rsplit_once(',')
                    .filter(|(axis, _)| axis.trim_end().ends_with(')'))
                    .ok_or_else(|| TransformError::new(text, "rotation needs an axis and an angle"))?;
                let axis = parse_vector(text, axis)?;
                if axis.length_squared() == 0.0 {
                    return Err(TransformError::new(text, "rotation axis is zero"));
                }
                let angle = parse_number(text, angle)?;
                DAffine3::from_quat(DQuat::from_axis_angle(axis.normalize(), angle.to_radians()))
            }
            "scale" => {
                let s = parse_number(text, rest)?;
                if s == 0.0 {
                    return Err(TransformError::new(text, "scale factor is zero"));
                }
                DAffine3::from_scale(DVec3::splat(s))
            }
            "" => return Err(TransformError::new(text, "empty factor")),
            other => return Err(TransformError::new(text, format!("unknown factor \"{other}\""))),
        };
        result = result * component;
    }
    Ok(result)
}

fn parse_number(text: &str, token: &str) -> Result<f64, TransformError> {
    token
        .trim()
        .parse()
        .map_err(|_| TransformError::new(text, format!("\"{}\" is not a number", token.trim())))
}

fn parse_vector(text: &str, token: &str) -> Result<DVec3, TransformError> {
    let inner = token
        .trim()
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(|| TransformError::new(text, "vectors are written as (x, y, z)"))?;
    let components = inner
        .split(',')
        .map(|c| parse_number(text, c))
        .collect::<Result<Vec<_>, _>>()?;
    match components[..] {
        [x, y, z] => Ok(DVec3::new(x, y, z)),
        _ => Err(TransformError::new(text, "vectors have three components")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rightmost_factor_applies_first() {
        let t = parse_transform("translate (100, 0, -5) * rotate (0, 0, 1), 90 * scale 2").unwrap();
        let p = t.transform_point3(DVec3::X);
        assert!(p.abs_diff_eq(DVec3::new(100.0, 2.0, -5.0), 1e-12), "{p}");
    }

    #[test]
    fn identity_and_case_are_accepted() {
        let t = parse_transform("Identity * TRANSLATE (1,2,3)").unwrap();
        assert!(t.transform_point3(DVec3::ZERO).abs_diff_eq(DVec3::new(1.0, 2.0, 3.0), 0.0));
    }

    #[test]
    fn malformed_factors_are_rejected() {
        for text in ["translate 1 2 3", "rotate (0, 0, 0), 10", "rotate (0, 0, 1)", "shear 2", "scale x", ""] {
            assert!(parse_transform(text).is_err(), "{text}");
        }
    }
}
