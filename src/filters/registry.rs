//! Operation registry.
//!
//! An [`Operation`] is a named recipe of [`Stage`]s applied one after
//! another. The registry keeps them in registration order so listings and
//! default sweeps are stable.

use crate::core::types::{Kernel, StructuringElement};
use crate::filters::convolution::BorderPolicy;
use indexmap::IndexMap;
use std::fmt;

/// A single transform bound to its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Convolution with an odd square kernel.
    Convolve { kernel: Kernel, border: BorderPolicy },
    /// Saturating sum of the clamped Sobel X and Y responses.
    Sobel,
    /// Binary erosion of a thresholded single-channel image.
    Erode(StructuringElement),
    /// Nearest-neighbour resampling.
    Resize { scale: f64 },
    /// Luminance conversion to one channel.
    Grayscale,
    /// Binary threshold, inclusive.
    Threshold { level: u8 },
    /// Multi-resolution composite of the (1, 1/2, 1/4) pyramid.
    Composite,
}

impl Stage {
    /// Convolution with the default zero border.
    pub fn convolve(kernel: Kernel) -> Self {
        Stage::Convolve {
            kernel,
            border: BorderPolicy::Zero,
        }
    }

    /// Short stage name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Convolve { .. } => "convolve",
            Stage::Sobel => "sobel",
            Stage::Erode(_) => "erode",
            Stage::Resize { .. } => "resize",
            Stage::Grayscale => "grayscale",
            Stage::Threshold { .. } => "threshold",
            Stage::Composite => "composite",
        }
    }

    /// Whether the device kernel for this stage does floating-point work.
    ///
    /// Float stages may differ from the CPU result by one step per sample.
    pub fn is_float(&self) -> bool {
        matches!(self, Stage::Convolve { .. } | Stage::Grayscale)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Convolve { kernel, border } => {
                write!(f, "convolve({}x{}, {:?} border)", kernel.size(), kernel.size(), border)
            }
            Stage::Sobel => write!(f, "sobel"),
            Stage::Erode(element) => write!(f, "erode(r={})", element.radius()),
            Stage::Resize { scale } => write!(f, "resize({})", scale),
            Stage::Grayscale => write!(f, "grayscale"),
            Stage::Threshold { level } => write!(f, "threshold({})", level),
            Stage::Composite => write!(f, "composite"),
        }
    }
}

/// A named recipe of stages.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    name: String,
    description: String,
    stages: Vec<Stage>,
}

impl Operation {
    /// Create an operation with no stages.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            stages: Vec::new(),
        }
    }

    /// Append a stage.
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Human-readable stage chain, e.g. `convolve(3x3, Zero border) -> resize(0.5)`.
    pub fn pipeline(&self) -> String {
        self.stages
            .iter()
            .map(Stage::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// Threshold applied before erosion in the built-in recipe.
pub const EROSION_THRESHOLD: u8 = 150;

/// Erosion radius of the built-in recipe.
pub const EROSION_RADIUS: u32 = 2;

/// Registry of named operations.
#[derive(Debug, Clone)]
pub struct OperationRegistry {
    operations: IndexMap<String, Operation>,
}

impl OperationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            operations: IndexMap::new(),
        }
    }

    /// Create a registry holding the built-in recipes.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_builtins(&mut registry);
        registry
    }

    /// Register an operation, replacing any existing one with the same name.
    pub fn register(&mut self, operation: Operation) {
        self.operations.insert(operation.name.clone(), operation);
    }

    /// Look up an operation by name.
    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(|s| s.as_str())
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    /// Search by name or description.
    pub fn search(&self, query: &str) -> Vec<&str> {
        let query = query.to_lowercase();
        self.operations
            .values()
            .filter(|op| {
                op.name.to_lowercase().contains(&query) || op.description.to_lowercase().contains(&query)
            })
            .map(|op| op.name.as_str())
            .collect()
    }

    /// Remove an operation, keeping the order of the rest.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.operations.shift_remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn register_builtins(registry: &mut OperationRegistry) {
    registry.register(
        Operation::new("sharpen-downscale", "Sharpen with the eight-neighbour kernel, then halve")
            .with_stage(Stage::convolve(Kernel::sharpen()))
            .with_stage(Stage::Resize { scale: 0.5 }),
    );
    registry.register(
        Operation::new("emboss-downscale", "Emboss with the diagonal relief kernel, then halve")
            .with_stage(Stage::convolve(Kernel::emboss()))
            .with_stage(Stage::Resize { scale: 0.5 }),
    );
    registry.register(
        Operation::new("sobel-downscale", "Grayscale, combine Sobel X and Y edges, then halve")
            .with_stage(Stage::Grayscale)
            .with_stage(Stage::Sobel)
            .with_stage(Stage::Resize { scale: 0.5 }),
    );

    // Radius is a small non-negative constant, so the element is always valid.
    if let Ok(element) = StructuringElement::new(EROSION_RADIUS as i64) {
        registry.register(
            Operation::new("binary-erosion", "Grayscale, threshold and erode the foreground mask")
                .with_stage(Stage::Grayscale)
                .with_stage(Stage::Threshold {
                    level: EROSION_THRESHOLD,
                })
                .with_stage(Stage::Erode(element)),
        );
    }

    registry.register(
        Operation::new("composite", "Blend the image with its half and quarter scale levels")
            .with_stage(Stage::Composite),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_in_order() {
        let registry = OperationRegistry::with_builtins();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(
            names,
            vec![
                "sharpen-downscale",
                "emboss-downscale",
                "sobel-downscale",
                "binary-erosion",
                "composite"
            ]
        );
    }

    #[test]
    fn test_sobel_recipe_stages() {
        let registry = OperationRegistry::with_builtins();
        let op = registry.get("sobel-downscale").unwrap();
        assert_eq!(op.pipeline(), "grayscale -> sobel -> resize(0.5)");
        assert!(!Stage::Sobel.is_float());
    }

    #[test]
    fn test_erosion_recipe_stages() {
        let registry = OperationRegistry::with_builtins();
        let op = registry.get("binary-erosion").unwrap();
        assert_eq!(op.stages().len(), 3);
        assert_eq!(op.stages()[1], Stage::Threshold { level: 150 });
        assert_eq!(op.pipeline(), "grayscale -> threshold(150) -> erode(r=2)");
    }

    #[test]
    fn test_register_replaces_and_unregister() {
        let mut registry = OperationRegistry::new();
        registry.register(Operation::new("blur", "first").with_stage(Stage::Grayscale));
        registry.register(Operation::new("blur", "second"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("blur").unwrap().description(), "second");
        assert!(registry.unregister("blur"));
        assert!(registry.is_empty());
        assert!(!registry.unregister("blur"));
    }

    #[test]
    fn test_search() {
        let registry = OperationRegistry::with_builtins();
        assert_eq!(registry.search("relief"), vec!["emboss-downscale"]);
        assert!(registry.search("nonexistent").is_empty());
    }

    #[test]
    fn test_float_stages() {
        assert!(Stage::convolve(Kernel::identity()).is_float());
        assert!(Stage::Grayscale.is_float());
        assert!(!Stage::Composite.is_float());
        assert!(!Stage::Resize { scale: 0.5 }.is_float());
    }
}
