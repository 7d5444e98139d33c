//! Turbine placement: positions plus catalog references.

use ow_core::{Real, TurbineTypeId};
use serde::{Deserialize, Serialize};

use crate::definition::{CatalogEntry, TurbineCatalog};
use crate::{TurbineError, TurbineResult};

/// Easting/northing in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: Real,
    pub y: Real,
}

impl Position {
    pub fn new(x: Real, y: Real) -> Self {
        Self { x, y }
    }
}

/// Positions with a parallel list of turbine types. Several positions may
/// share one catalog entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurbineLayout {
    positions: Vec<Position>,
    types: Vec<TurbineTypeId>,
}

impl TurbineLayout {
    pub fn new(positions: Vec<Position>, types: Vec<TurbineTypeId>) -> TurbineResult<Self> {
        if positions.len() != types.len() {
            return Err(TurbineError::LayoutMismatch {
                positions: positions.len(),
                types: types.len(),
            });
        }
        Ok(Self { positions, types })
    }

    /// Every position uses the same turbine type.
    pub fn uniform(positions: Vec<Position>, ty: TurbineTypeId) -> Self {
        let types = vec![ty; positions.len()];
        Self { positions, types }
    }

    pub fn push(&mut self, position: Position, ty: TurbineTypeId) {
        self.positions.push(position);
        self.types.push(ty);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn types(&self) -> &[TurbineTypeId] {
        &self.types
    }

    pub fn set_position(&mut self, index: usize, position: Position) -> TurbineResult<()> {
        let len = self.positions.len();
        let slot = self
            .positions
            .get_mut(index)
            .ok_or(TurbineError::IndexOutOfRange { index, len })?;
        *slot = position;
        Ok(())
    }

    /// Replace all positions, keeping the type list.
    pub fn move_to(&mut self, positions: Vec<Position>) -> TurbineResult<()> {
        if positions.len() != self.types.len() {
            return Err(TurbineError::LayoutMismatch {
                positions: positions.len(),
                types: self.types.len(),
            });
        }
        self.positions = positions;
        Ok(())
    }

    /// Type of the first turbine; the one written out when the engine
    /// replaces its turbine type.
    pub fn primary_type(&self) -> Option<TurbineTypeId> {
        self.types.first().copied()
    }

    pub fn primary<'a>(&self, catalog: &'a TurbineCatalog) -> TurbineResult<&'a CatalogEntry> {
        let id = self.primary_type().ok_or(TurbineError::EmptyLayout)?;
        catalog.require(id)
    }

    /// Check every referenced type exists in `catalog`.
    pub fn check_against(&self, catalog: &TurbineCatalog) -> TurbineResult<()> {
        for id in &self.types {
            catalog.require(*id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::sample_definition;

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = TurbineLayout::new(vec![Position::new(0.0, 0.0)], vec![]).unwrap_err();
        assert!(matches!(err, TurbineError::LayoutMismatch { positions: 1, types: 0 }));
    }

    #[test]
    fn primary_resolves_through_catalog() {
        let mut catalog = TurbineCatalog::new();
        let id = catalog.add("T1", sample_definition());
        let layout = TurbineLayout::uniform(vec![Position::new(1.0, 2.0), Position::new(3.0, 4.0)], id);
        assert_eq!(layout.primary(&catalog).unwrap().name, "T1");
        layout.check_against(&catalog).unwrap();

        let empty = TurbineLayout::default();
        assert!(matches!(empty.primary(&catalog), Err(TurbineError::EmptyLayout)));
    }

    #[test]
    fn move_to_keeps_types() {
        let mut catalog = TurbineCatalog::new();
        let id = catalog.add("T1", sample_definition());
        let mut layout = TurbineLayout::uniform(vec![Position::new(0.0, 0.0)], id);
        layout.move_to(vec![Position::new(5.0, 6.0)]).unwrap();
        assert_eq!(layout.positions()[0], Position::new(5.0, 6.0));
        assert!(layout.move_to(vec![]).is_err());
        assert!(layout.set_position(3, Position::new(0.0, 0.0)).is_err());
    }
}
