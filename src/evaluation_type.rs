use crate::scalar::Representation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

/// The kind of quantity a manager evaluates.
///
/// Each evaluation type selects exactly one scalar [`Representation`]. Evaluators are
/// instantiated once per evaluation type and usually include its display name (e.g.
/// `"<Jacobian>"`) in their own name.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EvaluationType {
    /// Plain residual values.
    Residual,
    /// Residual values with partial derivatives with respect to the local unknowns of each cell.
    Jacobian,
    /// Residual values with directional derivatives along a set of given directions.
    Tangent,
    /// Stochastic Galerkin residual: expansion coefficients in an orthogonal polynomial basis.
    SgResidual,
    /// Stochastic Galerkin residual with partial derivatives of every coefficient.
    SgJacobian,
    /// Stochastic Galerkin residual with directional derivatives of every coefficient.
    SgTangent,
    /// Multi-point residual: one value per ensemble sample.
    MpResidual,
    /// Multi-point residual with partial derivatives of every sample.
    MpJacobian,
    /// Multi-point residual with directional derivatives of every sample.
    MpTangent,
}

impl EvaluationType {
    pub const ALL: [EvaluationType; 9] = [
        Self::Residual,
        Self::Jacobian,
        Self::Tangent,
        Self::SgResidual,
        Self::SgJacobian,
        Self::SgTangent,
        Self::MpResidual,
        Self::MpJacobian,
        Self::MpTangent,
    ];

    pub fn representation(&self) -> Representation {
        match self {
            Self::Residual => Representation::Value,
            Self::Jacobian | Self::Tangent => Representation::Derivative,
            Self::SgResidual | Self::MpResidual => Representation::Expansion,
            Self::SgJacobian | Self::SgTangent | Self::MpJacobian | Self::MpTangent => {
                Representation::ExpansionDerivative
            }
        }
    }

    /// Whether values carry derivatives with respect to the local unknowns of each cell.
    pub fn is_jacobian(&self) -> bool {
        matches!(self, Self::Jacobian | Self::SgJacobian | Self::MpJacobian)
    }

    /// Whether values carry directional derivatives along the tangent directions.
    pub fn is_tangent(&self) -> bool {
        matches!(self, Self::Tangent | Self::SgTangent | Self::MpTangent)
    }

    /// Whether values are expansions (stochastic Galerkin or multi-point).
    pub fn is_expansion(&self) -> bool {
        matches!(
            self.representation(),
            Representation::Expansion | Representation::ExpansionDerivative
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Residual => "Residual",
            Self::Jacobian => "Jacobian",
            Self::Tangent => "Tangent",
            Self::SgResidual => "SGResidual",
            Self::SgJacobian => "SGJacobian",
            Self::SgTangent => "SGTangent",
            Self::MpResidual => "MPResidual",
            Self::MpJacobian => "MPJacobian",
            Self::MpTangent => "MPTangent",
        }
    }
}

impl Display for EvaluationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.name())
    }
}
