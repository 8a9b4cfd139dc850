//! Tree bookkeeping for the render layer.
//!
//! Subscribes to feature events and maintains per-block tree instances plus
//! falling trees for the advanced flavor. The advanced view is constructed
//! speculatively; when the host cannot support it the selector substitutes
//! the basic flavor instead of unwinding.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::config::{ConfigStore, CFG_TREES_3D, CFG_TREE_RADIUS};
use crate::error::GroundError;
use crate::events::{Event, EventListener};
use crate::features::FeatureDrawType;
use crate::math::{Fixed, Vec3Fixed};

/// Side length of one tree block, in terrain squares.
pub const TREE_SQUARE_SIZE: i32 = 64;

/// Draw-distance clamp factors, nearest to farthest band.
pub const MID_TREE_DIST_FACTOR: f64 = 1.0;
/// Fade band factor.
pub const FADE_TREE_DIST_FACTOR: f64 = 1.5;
/// Far band factor.
pub const FAR_TREE_DIST_FACTOR: f64 = 2.0;

/// Host capabilities the advanced flavor depends on.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewCaps {
    /// Geometry shaders are available.
    pub shader_support: bool,
}

/// One tree instance tracked for drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeInstance {
    /// Tree kind index.
    pub kind: u8,
    /// World position.
    pub pos: Vec3Fixed,
}

/// A tree knocked over with residual velocity, animated by the advanced
/// flavor only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallingTree {
    /// Tree kind index.
    pub kind: u8,
    /// Position at the moment of destruction.
    pub pos: Vec3Fixed,
    /// Topple direction.
    pub dir: Vec3Fixed,
}

/// Which flavor a [`TreeView`] ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeViewKind {
    /// Shader-driven view with falling-tree animation.
    Advanced,
    /// Plain per-block instance list.
    Basic,
}

/// Tree bookkeeping state shared by both flavors.
#[derive(Debug)]
pub struct TreeView {
    kind: TreeViewKind,
    /// Draw distance in blocks; persisted back to the config on shutdown.
    base_tree_distance: Fixed,
    blocks: BTreeMap<(i32, i32), Vec<TreeInstance>>,
    falling: Vec<FallingTree>,
}

impl TreeView {
    fn block_of(pos: Vec3Fixed) -> (i32, i32) {
        let block = Fixed::from_num(TREE_SQUARE_SIZE * crate::map::SQUARE_SIZE);
        let bx: i64 = (pos.x / block).floor().to_num();
        let bz: i64 = (pos.z / block).floor().to_num();
        (bx as i32, bz as i32)
    }

    /// Try to build the advanced flavor.
    ///
    /// # Errors
    ///
    /// Returns [`GroundError::TreeViewContent`] when the host lacks shader
    /// support.
    pub fn advanced(config: &ConfigStore, caps: ViewCaps) -> Result<Self, GroundError> {
        if !caps.shader_support {
            return Err(GroundError::TreeViewContent(
                "geometry shaders unavailable".into(),
            ));
        }
        Ok(Self::with_kind(config, TreeViewKind::Advanced))
    }

    /// Build the basic flavor; always succeeds.
    #[must_use]
    pub fn basic(config: &ConfigStore) -> Self {
        Self::with_kind(config, TreeViewKind::Basic)
    }

    fn with_kind(config: &ConfigStore, kind: TreeViewKind) -> Self {
        let radius = config
            .get_int(CFG_TREE_RADIUS, (5.5f64 * 256.0) as i64)
            .max(0);
        Self {
            kind,
            base_tree_distance: Fixed::from_num(radius) / Fixed::from_num(256),
            blocks: BTreeMap::new(),
            falling: Vec::new(),
        }
    }

    /// Select a flavor: advanced when configured and possible, basic as the
    /// fallback.
    #[must_use]
    pub fn create(config: &ConfigStore, caps: ViewCaps) -> Self {
        if config.get_bool(CFG_TREES_3D, true) {
            match Self::advanced(config, caps) {
                Ok(view) => return view,
                Err(e) => {
                    warn!(error = %e, "advanced tree view unavailable");
                    info!("tree view: falling back to the basic flavor");
                }
            }
        }
        Self::basic(config)
    }

    /// Which flavor was selected.
    #[must_use]
    pub fn kind(&self) -> TreeViewKind {
        self.kind
    }

    /// Draw distance clamped to the far band.
    #[must_use]
    pub fn tree_distance(&self, max_view_blocks: Fixed) -> Fixed {
        self.base_tree_distance
            .clamp(Fixed::ONE, max_view_blocks.max(Fixed::ONE))
    }

    /// Total tracked trees across all blocks.
    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.blocks.values().map(Vec::len).sum()
    }

    /// Falling trees currently animating (advanced flavor only).
    #[must_use]
    pub fn falling_count(&self) -> usize {
        self.falling.len()
    }

    /// Register a tree.
    pub fn add_tree(&mut self, kind: u8, pos: Vec3Fixed) {
        self.blocks
            .entry(Self::block_of(pos))
            .or_default()
            .push(TreeInstance { kind, pos });
    }

    /// Remove the tree at a position, if tracked.
    pub fn delete_tree(&mut self, pos: Vec3Fixed) {
        if let Some(block) = self.blocks.get_mut(&Self::block_of(pos)) {
            block.retain(|t| t.pos != pos);
        }
    }

    /// Write the persistent options back; call on shutdown.
    pub fn save_config(&self, config: &mut ConfigStore) {
        let radius: i64 = (self.base_tree_distance * Fixed::from_num(256))
            .round()
            .to_num();
        config.set_int(CFG_TREE_RADIUS, radius.max(0));
        config.set_bool(CFG_TREES_3D, self.kind == TreeViewKind::Advanced);
    }
}

impl EventListener for TreeView {
    fn on_event(&mut self, event: &Event) {
        match *event {
            Event::RenderFeatureMoved {
                old_pos,
                new_pos,
                draw_type: FeatureDrawType::Tree(kind),
                ..
            } => {
                self.delete_tree(old_pos);
                self.add_tree(kind, new_pos);
            }
            Event::RenderFeatureDestroyed {
                pos,
                speed,
                draw_type: FeatureDrawType::Tree(kind),
                ..
            } => {
                self.delete_tree(pos);

                if self.kind == TreeViewKind::Advanced
                    && speed.sq_length2d() > Fixed::from_num(0.25)
                {
                    self.falling.push(FallingTree {
                        kind,
                        pos,
                        dir: speed.normalize2d(),
                    });
                }
            }
            _ => {}
        }
    }
}
