// Damage tracking for partial texture updates
//
// Austin Shafer - 2020

/// A set of damaged regions accompanying a texture update.
///
/// When present, only these regions are copied from the staging buffer
/// into the destination image instead of the whole extent. Regions are
/// expressed in the texture's own coordinate system.
#[derive(Debug, Clone, PartialEq)]
pub struct Damage {
    pub d_regions: Vec<DamageRegion>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageRegion {
    pub r_pos: (i32, i32),
    pub r_size: (i32, i32),
}

impl Damage {
    pub fn empty() -> Self {
        Self {
            d_regions: Vec::new(),
        }
    }

    pub fn from_rect(pos: (i32, i32), size: (i32, i32)) -> Self {
        Self {
            d_regions: vec![DamageRegion {
                r_pos: pos,
                r_size: size,
            }],
        }
    }

    pub fn add(&mut self, pos: (i32, i32), size: (i32, i32)) {
        self.d_regions.push(DamageRegion {
            r_pos: pos,
            r_size: size,
        });
    }
}
