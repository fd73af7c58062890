//! Derived-style projector
//!
//! Maps the story's animated values onto per-layer render styles. Each layer
//! style is a [`Derived`] value recomputed whenever one of its inputs
//! changes; [`Projector::frame`] snapshots every style into the ordered
//! layer stack a renderer draws.

use crate::asset::Size;
use crate::config::StoryConfig;
use crate::layout::Layout;
use crate::story::StoryValues;
use petit_animation::{derive, AnimatedValue, Derived, ReadOnly, Subscription, Value, Vec2};
use serde::Serialize;
use std::fmt;

/// Opacity and translation of one layer
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LayerStyle {
    pub opacity: f32,
    pub translate: Vec2,
}

impl Default for LayerStyle {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            translate: Vec2::ZERO,
        }
    }
}

/// One image layer with its live style
pub struct Layer {
    pub name: String,
    pub source: String,
    pub size: Size,
    style: Derived<LayerStyle>,
}

impl Layer {
    pub fn style(&self) -> LayerStyle {
        self.style.get()
    }

    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&LayerStyle) + 'static,
    {
        self.style.subscribe(f)
    }

    pub fn read_only(&self) -> ReadOnly<LayerStyle> {
        self.style.read_only()
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("name", &self.name)
            .field("style", &self.style())
            .finish()
    }
}

/// Everything a renderer needs to draw one frame
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Frame {
    /// Layers bottom first
    pub layers: Vec<LayerFrame>,
    pub caption: Option<CaptionFrame>,
    pub starter: LayerStyle,
    pub restart: LayerStyle,
}

impl Frame {
    pub fn layer(&self, name: &str) -> Option<&LayerFrame> {
        self.layers.iter().find(|l| l.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LayerFrame {
    pub name: String,
    pub source: String,
    pub size: Size,
    pub style: LayerStyle,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CaptionFrame {
    pub text: String,
    pub style: LayerStyle,
}

/// Live styles for every layer, the caption and the two panels
pub struct Projector {
    layers: Vec<Layer>,
    caption: Derived<LayerStyle>,
    caption_text: ReadOnly<Option<String>>,
    starter: Derived<LayerStyle>,
    restart: Derived<LayerStyle>,
}

impl Projector {
    pub fn new(
        layout: &Layout,
        config: &StoryConfig,
        values: &StoryValues,
        caption_text: ReadOnly<Option<String>>,
    ) -> Self {
        let layers = layout
            .assets
            .iter()
            .map(|asset| {
                let reveal = config.asset(&asset.name).is_some_and(|a| a.reveal);
                let traveler = asset.name == config.timing.traveler;

                // Inputs are pushed in a fixed order and addressed by index
                let mut inputs = Vec::new();
                let mut input = |value: &AnimatedValue| {
                    inputs.push(value.clone());
                    inputs.len() - 1
                };
                let reveal_at = reveal.then(|| input(&values.canvas_opacity));
                let flicker_at = values.flicker(&asset.name).map(&mut input);
                let travel_at = traveler.then(|| input(&values.traveler_position));

                let base = asset.initial_position;
                let group_offset = layout.group_offset;
                let style = derive(&inputs, move |current| {
                    let opacity = scalar(current, reveal_at) * scalar(current, flicker_at);
                    let position = travel_at
                        .and_then(|i| current.get(i).copied().flatten())
                        .and_then(|v| v.as_vec2())
                        .unwrap_or(base);
                    LayerStyle {
                        opacity,
                        translate: group_offset + position,
                    }
                });

                Layer {
                    name: asset.name.clone(),
                    source: asset.source.clone(),
                    size: asset.size,
                    style,
                }
            })
            .collect();

        let caption = derive(
            &[values.caption_opacity.clone(), values.caption_offset.clone()],
            |current| LayerStyle {
                opacity: scalar(current, Some(0)),
                translate: Vec2::new(0.0, scalar(current, Some(1))),
            },
        );

        Self {
            layers,
            caption,
            caption_text,
            starter: panel(&values.starter_opacity),
            restart: panel(&values.restart_opacity),
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn caption_style(&self) -> LayerStyle {
        self.caption.get()
    }

    /// Snapshot of every style, in draw order
    pub fn frame(&self) -> Frame {
        Frame {
            layers: self
                .layers
                .iter()
                .map(|layer| LayerFrame {
                    name: layer.name.clone(),
                    source: layer.source.clone(),
                    size: layer.size,
                    style: layer.style(),
                })
                .collect(),
            caption: self.caption_text.get().map(|text| CaptionFrame {
                text,
                style: self.caption.get(),
            }),
            starter: self.starter.get(),
            restart: self.restart.get(),
        }
    }
}

impl fmt::Debug for Projector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projector")
            .field("layers", &self.layers)
            .finish()
    }
}

/// Scalar input at `at`, or 1 when absent
fn scalar(current: &[Option<Value>], at: Option<usize>) -> f32 {
    at.and_then(|i| current.get(i).copied().flatten())
        .and_then(|v| v.as_float())
        .unwrap_or(1.0)
}

fn panel(opacity: &AnimatedValue) -> Derived<LayerStyle> {
    derive(std::slice::from_ref(opacity), |current| LayerStyle {
        opacity: scalar(current, Some(0)),
        translate: Vec2::ZERO,
    })
}
