//! In-memory image fixture implementing the reader collaborator traits.
#![allow(dead_code)]

use cryptomatte::{ImageReader, ImageSpec, PixelType, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A fully in-memory "image file" for driving the loader in tests.
pub struct TestImage {
    spec:   ImageSpec,
    planes: HashMap<String, Vec<f32>>,
}

impl TestImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            spec: ImageSpec {
                width,
                height,
                channel_names: Vec::new(),
                pixel_type: PixelType::Float32,
                attributes: Map::new(),
            },
            planes: HashMap::new(),
        }
    }

    pub fn pixel_type(mut self, ty: PixelType) -> Self {
        self.spec.pixel_type = ty;
        self
    }

    pub fn attribute(mut self, key: &str, value: &str) -> Self {
        self.spec.attributes.insert(key.to_string(), Value::String(value.to_string()));
        self
    }

    pub fn channel(mut self, name: &str, pixels: Vec<f32>) -> Self {
        self.spec.channel_names.push(name.to_string());
        self.planes.insert(name.to_string(), pixels);
        self
    }

    /// Declare a channel name in the spec without backing pixels, to
    /// provoke `MissingChannel` at read time.
    pub fn phantom_channel(mut self, name: &str) -> Self {
        self.spec.channel_names.push(name.to_string());
        self
    }

    /// Add the three metadata attributes every cryptomatte needs.
    pub fn cryptomatte(self, key: &str, typename: &str) -> Self {
        self.attribute(&format!("cryptomatte/{key}/name"), typename)
            .attribute(&format!("cryptomatte/{key}/hash"), "MurmurHash3_32")
            .attribute(&format!("cryptomatte/{key}/conversion"), "uint32_to_float32")
    }
}

impl ImageReader for TestImage {
    fn spec(&self) -> &ImageSpec {
        &self.spec
    }

    fn read_channels(&mut self, names: &[String]) -> Result<HashMap<String, Vec<f32>>> {
        Ok(names
            .iter()
            .filter_map(|n| self.planes.get(n).map(|p| (n.clone(), p.clone())))
            .collect())
    }
}
