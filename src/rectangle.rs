use crate::error::{Error, Result};
use crate::object::Object;

/// A rectangle in PDF user space, normalized so that `lower_left` is the
/// numerically smaller corner regardless of the order the file stored it in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rectangle {
    pub lower_left: (f64, f64),
    pub upper_right: (f64, f64),
}

impl Rectangle {
    pub fn new(llx: f64, lly: f64, urx: f64, ury: f64) -> Rectangle {
        Rectangle {
            lower_left: (llx.min(urx), lly.min(ury)),
            upper_right: (llx.max(urx), lly.max(ury)),
        }
    }

    /// Build from a `[llx lly urx ury]` array as found in `/MediaBox`,
    /// `/CropBox`, `/BBox` and annotation `/Rect` entries.
    pub fn from_array(array: &[Object]) -> Result<Rectangle> {
        if array.len() != 4 {
            return Err(Error::ObjectType {
                expected: "Array of four numbers",
                found: "Array",
            });
        }
        let mut n = [0.0f64; 4];
        for (slot, obj) in n.iter_mut().zip(array) {
            *slot = obj.as_float()?;
        }
        Ok(Rectangle::new(n[0], n[1], n[2], n[3]))
    }

    pub fn width(&self) -> f64 {
        self.upper_right.0 - self.lower_left.0
    }

    pub fn height(&self) -> f64 {
        self.upper_right.1 - self.lower_left.1
    }

    pub fn to_object(self) -> Object {
        Object::Array(vec![
            self.lower_left.0.into(),
            self.lower_left.1.into(),
            self.upper_right.0.into(),
            self.upper_right.1.into(),
        ])
    }
}

impl TryFrom<&Object> for Rectangle {
    type Error = Error;

    fn try_from(object: &Object) -> Result<Rectangle> {
        Rectangle::from_array(object.as_array()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_are_normalized() {
        let rect = Rectangle::from_array(&[
            Object::Integer(612),
            Object::Real(792.0),
            Object::Integer(0),
            Object::Integer(0),
        ])
        .unwrap();
        assert_eq!(rect.lower_left, (0.0, 0.0));
        assert_eq!(rect.upper_right, (612.0, 792.0));
        assert_eq!(rect.width(), 612.0);
        assert_eq!(rect.height(), 792.0);
    }

    #[test]
    fn wrong_arity_is_rejected() {
        assert!(Rectangle::from_array(&[Object::Integer(1)]).is_err());
    }
}
