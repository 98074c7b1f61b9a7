//! Species table
//!
//! Static, per-run chemical definitions: primary species (whose totals are
//! transported and reacted), secondary species (complexes and sorbed forms
//! derived by speciation), and the stoichiometry matrix linking them.
//!
//! # Layout convention
//!
//! Primary species are ordered so that the **mobile** ones come first:
//!
//! ```text
//! index   0 .. n_mobile          → transported by the advection-dispersion solver
//! index   n_mobile .. n_total    → immobile primaries (minerals, surface sites)
//! ```
//!
//! The stoichiometry ("total concentration") matrix has shape
//! `[n_total × (n_total + n_secondary)]`: entry `(j, n_total + k)` is the
//! number of primary `j` units contained in secondary species `k`.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{CouplingError, Result};

// =================================================================================================
// Classification
// =================================================================================================

/// Chemical class of a species
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChemicalClass {
    /// Dissolved in pore water
    Aqueous,

    /// Solid phase; does not partition between zones
    Mineral,

    /// Surface complex / sorbed species
    Adsorption,

    /// Ion-exchange site species
    CationExchange,
}

/// How a primary species takes part in mass-action totals
///
/// | Variant    | Transported | Sorbed part subtracted before transport |
/// |------------|-------------|-----------------------------------------|
/// | `Immobile` | no          | no                                      |
/// | `Mobile`   | yes         | no                                      |
/// | `Mixed`    | yes         | yes                                     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MassAction {
    Immobile,
    Mobile,
    Mixed,
}

/// Definition of one chemical species
///
/// In JSON, `mass_action` may be omitted: minerals then default to
/// `immobile`, every other class to `mobile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SpeciesRecord")]
pub struct Species {
    /// Name used in logs, forcing columns and CSV headers
    pub name: String,

    /// Chemical class
    pub class: ChemicalClass,

    /// Mass-action participation (ignored for secondary species)
    pub mass_action: MassAction,

    /// Molecular diffusion coefficient **\[m²/s\]**
    pub diffusion: f64,

    /// Dispersivity **\[m\]**; multiplied by face velocity
    pub dispersivity: f64,
}

/// Serialized form of [`Species`] with an optional mass-action type
#[derive(Deserialize)]
struct SpeciesRecord {
    name: String,
    class: ChemicalClass,
    #[serde(default)]
    mass_action: Option<MassAction>,
    #[serde(default)]
    diffusion: f64,
    #[serde(default)]
    dispersivity: f64,
}

impl From<SpeciesRecord> for Species {
    fn from(rec: SpeciesRecord) -> Self {
        let mass_action = rec.mass_action.unwrap_or(match rec.class {
            ChemicalClass::Mineral => MassAction::Immobile,
            _ => MassAction::Mobile,
        });
        Self {
            name: rec.name,
            class: rec.class,
            mass_action,
            diffusion: rec.diffusion,
            dispersivity: rec.dispersivity,
        }
    }
}

impl Species {
    /// Create an aqueous, mobile species
    pub fn aqueous(name: impl Into<String>, diffusion: f64, dispersivity: f64) -> Self {
        Self {
            name: name.into(),
            class: ChemicalClass::Aqueous,
            mass_action: MassAction::Mobile,
            diffusion,
            dispersivity,
        }
    }

    /// Create an immobile mineral species
    pub fn mineral(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: ChemicalClass::Mineral,
            mass_action: MassAction::Immobile,
            diffusion: 0.0,
            dispersivity: 0.0,
        }
    }

    /// Create a secondary species of the given class
    pub fn secondary(name: impl Into<String>, class: ChemicalClass) -> Self {
        Self {
            name: name.into(),
            class,
            mass_action: MassAction::Immobile,
            diffusion: 0.0,
            dispersivity: 0.0,
        }
    }

    /// Builder: override the mass-action type
    pub fn with_mass_action(mut self, mass_action: MassAction) -> Self {
        self.mass_action = mass_action;
        self
    }

    /// Whether the species is transported
    pub fn is_mobile(&self) -> bool {
        self.mass_action != MassAction::Immobile
    }

    /// Whether the species is a mineral
    pub fn is_mineral(&self) -> bool {
        self.class == ChemicalClass::Mineral
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CouplingError::SpeciesTable("species name must not be empty".into()));
        }
        if !(self.diffusion >= 0.0 && self.diffusion.is_finite()) {
            return Err(CouplingError::SpeciesTable(format!(
                "species '{}': diffusion must be finite and >= 0, got {}",
                self.name, self.diffusion
            )));
        }
        if !(self.dispersivity >= 0.0 && self.dispersivity.is_finite()) {
            return Err(CouplingError::SpeciesTable(format!(
                "species '{}': dispersivity must be finite and >= 0, got {}",
                self.name, self.dispersivity
            )));
        }
        Ok(())
    }
}

// =================================================================================================
// Species table
// =================================================================================================

/// Serialized form of a chemistry definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChemistryDefinition {
    pub primary: Vec<Species>,
    #[serde(default)]
    pub secondary: Vec<Species>,
    /// Rows = primary species, columns = primary + secondary species
    #[serde(default)]
    pub stoichiometry: Vec<Vec<f64>>,
}

/// Immutable per-run species definitions
#[derive(Debug, Clone)]
pub struct SpeciesTable {
    primary: Vec<Species>,
    secondary: Vec<Species>,
    n_mobile: usize,
    total: DMatrix<f64>,
    /// For each mobile `Mixed` primary: `(secondary index, coefficient)` of
    /// every non-aqueous secondary species contributing to its total.
    sorption: Vec<Vec<(usize, f64)>>,
}

impl SpeciesTable {
    /// Build a table from primary/secondary species and the stoichiometry matrix
    ///
    /// # Errors
    ///
    /// - no primary species
    /// - duplicate names
    /// - a mobile primary listed after an immobile one
    /// - a mineral primary marked mobile
    /// - matrix shape differs from `[n_total × (n_total + n_secondary)]`
    pub fn new(primary: Vec<Species>, secondary: Vec<Species>, total: DMatrix<f64>) -> Result<Self> {
        if primary.is_empty() {
            return Err(CouplingError::SpeciesTable("at least one primary species is required".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for sp in primary.iter().chain(secondary.iter()) {
            sp.validate()?;
            if !seen.insert(sp.name.as_str()) {
                return Err(CouplingError::SpeciesTable(format!("duplicate species name '{}'", sp.name)));
            }
        }

        if let Some(mineral) = primary.iter().find(|sp| sp.is_mineral() && sp.is_mobile()) {
            return Err(CouplingError::SpeciesTable(format!(
                "mineral '{}' cannot be transported; use mass_action \"immobile\"",
                mineral.name
            )));
        }

        let n_mobile = primary.iter().take_while(|sp| sp.is_mobile()).count();
        if let Some(late) = primary[n_mobile..].iter().find(|sp| sp.is_mobile()) {
            return Err(CouplingError::SpeciesTable(format!(
                "mobile species '{}' must be listed before all immobile species",
                late.name
            )));
        }

        let n_total = primary.len();
        let n_cols = n_total + secondary.len();
        if total.nrows() != n_total {
            return Err(CouplingError::dimension_mismatch("stoichiometry rows", n_total, total.nrows()));
        }
        if total.ncols() != n_cols {
            return Err(CouplingError::dimension_mismatch("stoichiometry columns", n_cols, total.ncols()));
        }

        let sorption = (0..n_mobile)
            .map(|j| {
                if primary[j].mass_action != MassAction::Mixed {
                    return Vec::new();
                }
                secondary
                    .iter()
                    .enumerate()
                    .filter(|(k, sp)| total[(j, n_total + k)] != 0.0 && sp.class != ChemicalClass::Aqueous)
                    .map(|(k, _)| (k, total[(j, n_total + k)]))
                    .collect()
            })
            .collect();

        Ok(Self { primary, secondary, n_mobile, total, sorption })
    }

    /// Table of primary species only, identity stoichiometry
    pub fn primary_only(primary: Vec<Species>) -> Result<Self> {
        let n = primary.len();
        Self::new(primary, Vec::new(), DMatrix::identity(n, n))
    }

    /// Build from a serialized definition; an empty stoichiometry means identity
    pub fn from_definition(def: ChemistryDefinition) -> Result<Self> {
        let n_total = def.primary.len();
        let n_cols = n_total + def.secondary.len();

        let total = if def.stoichiometry.is_empty() {
            DMatrix::from_fn(n_total, n_cols, |i, j| if i == j { 1.0 } else { 0.0 })
        } else {
            if def.stoichiometry.len() != n_total {
                return Err(CouplingError::dimension_mismatch(
                    "stoichiometry rows",
                    n_total,
                    def.stoichiometry.len(),
                ));
            }
            for row in &def.stoichiometry {
                if row.len() != n_cols {
                    return Err(CouplingError::dimension_mismatch("stoichiometry columns", n_cols, row.len()));
                }
            }
            DMatrix::from_fn(n_total, n_cols, |i, j| def.stoichiometry[i][j])
        };

        Self::new(def.primary, def.secondary, total)
    }

    /// Parse a JSON chemistry definition
    pub fn from_json_str(json: &str) -> Result<Self> {
        let def: ChemistryDefinition = serde_json::from_str(json)?;
        Self::from_definition(def)
    }

    /// Number of primary species (length of total-concentration vectors)
    pub fn n_total(&self) -> usize {
        self.primary.len()
    }

    /// Number of mobile primary species
    pub fn n_mobile(&self) -> usize {
        self.n_mobile
    }

    /// Number of secondary species
    pub fn n_secondary(&self) -> usize {
        self.secondary.len()
    }

    pub fn primary(&self) -> &[Species] {
        &self.primary
    }

    pub fn secondary(&self) -> &[Species] {
        &self.secondary
    }

    /// Primary species by index
    pub fn species(&self, index: usize) -> &Species {
        &self.primary[index]
    }

    /// Index of a primary species by name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.primary.iter().position(|sp| sp.name == name)
    }

    /// Index of a primary species by name, as an error when missing
    pub fn require(&self, name: &str) -> Result<usize> {
        self.index_of(name).ok_or_else(|| CouplingError::UnknownSpecies(name.to_string()))
    }

    /// Stoichiometry matrix
    pub fn total_matrix(&self) -> &DMatrix<f64> {
        &self.total
    }

    /// Sorbed contributions to the total of mobile species `j`
    ///
    /// Empty unless `j` is mobile with [`MassAction::Mixed`].
    pub fn sorption_terms(&self, j: usize) -> &[(usize, f64)] {
        self.sorption.get(j).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any species needs the pre/post transport sorption correction
    pub fn has_sorption(&self) -> bool {
        self.sorption.iter().any(|terms| !terms.is_empty())
    }

    /// Indices of mineral primaries
    pub fn mineral_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.primary.iter().enumerate().filter(|(_, sp)| sp.is_mineral()).map(|(j, _)| j)
    }
}

// =================================================================================================
// Tests
// =================================================================================================
