//! Surface-owned drawing resources.
//!
//! Each wrapper carries the generation of the target it was created against.
//! After device loss or a rebind the surface's generation moves on and older
//! resources are rejected with `OverlayError::StaleResource`.

use crate::platform::{FontDescriptor, GraphicsBackend};
use crate::types::Size;

pub struct Brush<B: GraphicsBackend> {
    pub(crate) native: B::Brush,
    pub(crate) generation: u64,
}

pub struct Font<B: GraphicsBackend> {
    pub(crate) id: u64,
    pub(crate) descriptor: FontDescriptor,
    pub(crate) native: B::Font,
    pub(crate) generation: u64,
}

pub struct Image<B: GraphicsBackend> {
    pub(crate) native: B::Image,
    pub(crate) size: Size,
    pub(crate) generation: u64,
}

pub struct Geometry<B: GraphicsBackend> {
    pub(crate) native: B::Geometry,
    pub(crate) generation: u64,
}

impl<B: GraphicsBackend> Brush<B> {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<B: GraphicsBackend> Font<B> {
    /// The descriptor the font was created from; pass it back to
    /// `create_font` after the surface is recreated.
    pub fn descriptor(&self) -> &FontDescriptor {
        &self.descriptor
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<B: GraphicsBackend> Image<B> {
    pub fn size(&self) -> Size {
        self.size
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<B: GraphicsBackend> Geometry<B> {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

// Manual impls: derive would demand `B: Clone`.

impl<B: GraphicsBackend> Clone for Brush<B> {
    fn clone(&self) -> Self {
        Self {
            native: self.native.clone(),
            generation: self.generation,
        }
    }
}

impl<B: GraphicsBackend> Clone for Font<B> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            descriptor: self.descriptor.clone(),
            native: self.native.clone(),
            generation: self.generation,
        }
    }
}

impl<B: GraphicsBackend> Clone for Image<B> {
    fn clone(&self) -> Self {
        Self {
            native: self.native.clone(),
            size: self.size,
            generation: self.generation,
        }
    }
}

impl<B: GraphicsBackend> Clone for Geometry<B> {
    fn clone(&self) -> Self {
        Self {
            native: self.native.clone(),
            generation: self.generation,
        }
    }
}
