//! Extended relation stores (`spec.md` §3, §4.D): route relations and turn
//! relations, kept separately since they're processed by unrelated
//! algorithms (route-tag fixpoint vs. turn-restriction resolution against
//! the live graph, both in [`crate::relations`]).

use crate::error::{CoreError, Result};
use crate::model::{RouteRelX, TurnRelX};

#[derive(Default)]
pub struct RouteRelsX {
    entries: Vec<RouteRelX>,
}

impl RouteRelsX {
    pub fn new() -> Self {
        RouteRelsX::default()
    }

    pub fn append(&mut self, rel: RouteRelX) -> Result<()> {
        if self.entries.len() >= u32::MAX as usize {
            return Err(CoreError::CapacityExceeded("RouteRelsX"));
        }
        self.entries.push(rel);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteRelX> {
        self.entries.iter()
    }
}

#[derive(Default)]
pub struct TurnRelsX {
    entries: Vec<TurnRelX>,
}

impl TurnRelsX {
    pub fn new() -> Self {
        TurnRelsX::default()
    }

    pub fn append(&mut self, rel: TurnRelX) -> Result<()> {
        if self.entries.len() >= u32::MAX as usize {
            return Err(CoreError::CapacityExceeded("TurnRelsX"));
        }
        self.entries.push(rel);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TurnRelX> {
        self.entries.iter()
    }
}
