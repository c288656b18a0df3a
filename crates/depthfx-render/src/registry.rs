//! Logical texture slots.
//!
//! Passes refer to textures by name ("depth.filtered", "coc", ...). The
//! registry assigns each name a stable [`TextureUnit`] the first time it is
//! registered and keeps that assignment for its whole lifetime, so a texture
//! recreated after a resize or context loss lands on the same binding point.
//! Handles are modelled as [`SlotState`], making use-before-bind an explicit
//! error instead of a null check.

use std::collections::HashMap;
use std::fmt;

use depthfx_core::{DepthFxError, DepthFxResult};

/// Stable binding point of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureUnit(pub u32);

impl fmt::Display for TextureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit {}", self.0)
    }
}

/// Whether a slot currently holds a handle.
#[derive(Debug)]
pub enum SlotState<H> {
    Uninitialized,
    Bound(H),
}

impl<H> SlotState<H> {
    pub fn is_bound(&self) -> bool {
        matches!(self, SlotState::Bound(_))
    }
}

#[derive(Debug)]
pub struct TextureSlot<H> {
    pub name: String,
    pub unit: TextureUnit,
    pub format: wgpu::TextureFormat,
    pub state: SlotState<H>,
}

/// A GPU texture bound into a slot.
#[derive(Debug)]
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl GpuTexture {
    /// Allocate a 2D texture with a default view.
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Name to slot allocator owning the bound handles.
#[derive(Debug)]
pub struct TextureRegistry<H> {
    slots: Vec<TextureSlot<H>>,
    by_name: HashMap<String, TextureUnit>,
}

impl<H> Default for TextureRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> TextureRegistry<H> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Register `name`, or return its existing unit.
    ///
    /// Units are handed out in registration order starting at zero. A second
    /// registration of the same name must agree on the format.
    pub fn register(&mut self, name: &str, format: wgpu::TextureFormat) -> DepthFxResult<TextureUnit> {
        if let Some(&unit) = self.by_name.get(name) {
            let slot = &mut self.slots[unit.0 as usize];
            if slot.format != format {
                if slot.state.is_bound() {
                    return Err(DepthFxError::Graph(format!(
                        "slot '{name}' is bound as {:?}, cannot re-register as {format:?}",
                        slot.format
                    )));
                }
                // Unbound slots may change format, e.g. a capability fallback.
                slot.format = format;
            }
            return Ok(unit);
        }

        let unit = TextureUnit(self.slots.len() as u32);
        self.slots.push(TextureSlot {
            name: name.to_string(),
            unit,
            format,
            state: SlotState::Uninitialized,
        });
        self.by_name.insert(name.to_string(), unit);
        tracing::trace!(name, %unit, "Registered texture slot");
        Ok(unit)
    }

    pub fn unit(&self, name: &str) -> Option<TextureUnit> {
        self.by_name.get(name).copied()
    }

    pub fn slot(&self, unit: TextureUnit) -> Option<&TextureSlot<H>> {
        self.slots.get(unit.0 as usize)
    }

    /// Bind a handle, returning the previous one.
    pub fn bind(&mut self, unit: TextureUnit, handle: H) -> DepthFxResult<Option<H>> {
        let slot = self
            .slots
            .get_mut(unit.0 as usize)
            .ok_or_else(|| DepthFxError::Graph(format!("{unit} was never registered")))?;
        match std::mem::replace(&mut slot.state, SlotState::Bound(handle)) {
            SlotState::Bound(previous) => Ok(Some(previous)),
            SlotState::Uninitialized => Ok(None),
        }
    }

    /// Drop the handle, keeping the unit assignment.
    pub fn release(&mut self, unit: TextureUnit) -> Option<H> {
        let slot = self.slots.get_mut(unit.0 as usize)?;
        match std::mem::replace(&mut slot.state, SlotState::Uninitialized) {
            SlotState::Bound(handle) => Some(handle),
            SlotState::Uninitialized => None,
        }
    }

    /// Release every handle, e.g. on context loss or disposal.
    pub fn release_all(&mut self) -> usize {
        let mut released = 0;
        for slot in &mut self.slots {
            if let SlotState::Bound(_) = std::mem::replace(&mut slot.state, SlotState::Uninitialized) {
                released += 1;
            }
        }
        released
    }

    /// The bound handle of `unit`, or [`DepthFxError::SlotUnbound`].
    pub fn get(&self, unit: TextureUnit) -> DepthFxResult<&H> {
        let slot = self
            .slots
            .get(unit.0 as usize)
            .ok_or_else(|| DepthFxError::Graph(format!("{unit} was never registered")))?;
        match &slot.state {
            SlotState::Bound(handle) => Ok(handle),
            SlotState::Uninitialized => Err(DepthFxError::SlotUnbound {
                name: slot.name.clone(),
                unit: unit.0,
            }),
        }
    }

    pub fn get_by_name(&self, name: &str) -> DepthFxResult<&H> {
        let unit = self
            .unit(name)
            .ok_or_else(|| DepthFxError::Graph(format!("texture slot '{name}' was never registered")))?;
        self.get(unit)
    }

    pub fn is_bound(&self, unit: TextureUnit) -> bool {
        self.slot(unit).is_some_and(|slot| slot.state.is_bound())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
