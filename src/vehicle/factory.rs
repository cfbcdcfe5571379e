use super::{Driver, DriverId, PendingVehicle, VehicleAttributes};
use crate::lane::Lane;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Role tag given to drivers before a generator assigns one.
pub const DEFAULT_ROLE: &str = "default";

/// Manufactures vehicles for a generator.
pub trait VehicleFactory {
    /// Creates a new vehicle and driver for the given lane.
    ///
    /// # Parameters
    /// * `lane` - The lane the vehicle will enter
    /// * `offset` - The position along the lane at which the vehicle's rear is placed
    /// * `sequence` - A simulation-wide sequence number, unique to this vehicle
    fn generate(&mut self, lane: &Lane, offset: f64, sequence: u64) -> PendingVehicle;
}

/// A factory which picks each vehicle's attributes from a weighted set of templates.
///
/// The choice for a given sequence number depends only on the seed,
/// so repeated runs produce the same vehicles.
#[derive(Clone, Debug)]
pub struct TemplateFactory {
    templates: Vec<VehicleAttributes>,
    weights: Option<WeightedIndex<f64>>,
    seed: u64,
}

impl TemplateFactory {
    /// A factory which always produces vehicles with the given attributes.
    pub fn new(attributes: VehicleAttributes) -> Self {
        Self {
            templates: vec![attributes],
            weights: None,
            seed: 0,
        }
    }

    /// A factory which picks among templates in proportion to their weights.
    /// Templates with invalid weights are ignored; if none remain,
    /// the default attributes are used.
    pub fn weighted(templates: &[(VehicleAttributes, f64)], seed: u64) -> Self {
        let templates = templates
            .iter()
            .filter(|(_, w)| w.is_finite() && *w > 0.0)
            .copied()
            .collect::<Vec<_>>();
        let weights = WeightedIndex::new(templates.iter().map(|(_, w)| *w)).ok();
        let templates = match templates.is_empty() {
            true => vec![VehicleAttributes::default()],
            false => templates.into_iter().map(|(a, _)| a).collect(),
        };
        Self {
            templates,
            weights,
            seed,
        }
    }

    fn choose(&self, sequence: u64) -> VehicleAttributes {
        let idx = match &self.weights {
            Some(weights) if self.templates.len() > 1 => {
                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(sequence));
                weights.sample(&mut rng)
            }
            _ => 0,
        };
        self.templates[idx]
    }
}

impl Default for TemplateFactory {
    fn default() -> Self {
        Self::new(VehicleAttributes::default())
    }
}

impl VehicleFactory for TemplateFactory {
    fn generate(&mut self, _lane: &Lane, offset: f64, sequence: u64) -> PendingVehicle {
        let driver = Driver::new(DriverId(sequence), DEFAULT_ROLE);
        PendingVehicle::new(self.choose(sequence), offset, driver)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn car() -> VehicleAttributes {
        VehicleAttributes {
            width: 1.8,
            length: 4.5,
        }
    }

    fn truck() -> VehicleAttributes {
        VehicleAttributes {
            width: 2.5,
            length: 12.0,
        }
    }

    #[test]
    fn weighted_choice_is_reproducible() {
        let a = TemplateFactory::weighted(&[(car(), 3.0), (truck(), 1.0)], 5);
        let b = TemplateFactory::weighted(&[(car(), 3.0), (truck(), 1.0)], 5);
        let picks_a = (0..200).map(|i| a.choose(i)).collect::<Vec<_>>();
        let picks_b = (0..200).map(|i| b.choose(i)).collect::<Vec<_>>();
        assert_eq!(picks_a, picks_b);

        let trucks = picks_a.iter().filter(|a| **a == truck()).count();
        assert!(trucks > 20 && trucks < 90, "{} trucks", trucks);
    }

    #[test]
    fn invalid_weights_fall_back() {
        let factory = TemplateFactory::weighted(&[(truck(), 0.0), (car(), f64::NAN)], 0);
        assert_eq!(factory.choose(3), VehicleAttributes::default());

        let factory = TemplateFactory::weighted(&[(truck(), 0.0), (car(), 1.0)], 0);
        assert_eq!(factory.choose(3), car());
    }
}
