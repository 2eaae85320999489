//! Disjunctions: anonymous unions of model frames.

use std::collections::BTreeSet;

use crate::error::{ModelError, ModelResult};
use crate::identity::FrameId;
use crate::setalgo::{most_general, most_specific};
use crate::value::FrameType;

use super::{Model, Visibility};

/// A set of two or more model frames, none subsuming another.
///
/// Only [`Disjunction::resolve`] creates disjunctions, so the invariant
/// holds for every value of this type. Equality is set equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Disjunction {
    disjuncts: BTreeSet<FrameId>,
}

impl Disjunction {
    /// Normalise a list of frame-types into a single frame-type.
    ///
    /// Nested disjunctions are flattened and disjuncts subsumed by other
    /// disjuncts dropped. A single remaining frame is returned directly.
    pub fn resolve(model: &Model, types: impl IntoIterator<Item = FrameType>) -> ModelResult<FrameType> {
        let mut frames = Vec::new();
        for t in types {
            match t {
                FrameType::Model(f) => {
                    model.frame(f)?;
                    frames.push(f);
                }
                FrameType::Disjunction(d) => frames.extend(d.disjuncts()),
                FrameType::Extension(_) => {
                    return Err(ModelError::ExtensionInDisjunction {
                        frame: model.describe(&t),
                    });
                }
            }
        }
        let kept = most_general(frames, |a, b| model.frame_subsumes(*a, *b));
        match kept.len() {
            0 => Err(ModelError::EmptyDisjunction),
            1 => Ok(FrameType::Model(kept[0])),
            _ => Ok(FrameType::Disjunction(Disjunction {
                disjuncts: kept.into_iter().collect(),
            })),
        }
    }

    /// Disjuncts in handle order.
    pub fn disjuncts(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.disjuncts.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.disjuncts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.disjuncts.is_empty()
    }

    pub fn contains(&self, frame: FrameId) -> bool {
        self.disjuncts.contains(&frame)
    }

    /// Closest unambiguous model-frame supertype.
    ///
    /// Candidates are the most specific common subsumers of all disjuncts.
    /// While several remain, they are replaced by the most specific common
    /// strict subsumers of the candidates; the root ends the climb.
    pub fn subsumer(&self, model: &Model) -> FrameId {
        let closures: Vec<Vec<FrameId>> = self
            .disjuncts()
            .map(|d| {
                let mut up = vec![d];
                up.extend(model.ancestors(d, Visibility::All).iter().copied());
                up
            })
            .collect();
        let mut candidates = most_specific(intersect(closures), |a, b| model.frame_subsumes(*a, *b));
        while candidates.len() > 1 {
            let strict: Vec<Vec<FrameId>> = candidates
                .iter()
                .map(|c| model.ancestors(*c, Visibility::All).to_vec())
                .collect();
            candidates = most_specific(intersect(strict), |a, b| model.frame_subsumes(*a, *b));
        }
        candidates.first().copied().unwrap_or_else(|| model.root())
    }
}

/// Elements present in every list, in the order of the first list.
fn intersect(lists: Vec<Vec<FrameId>>) -> Vec<FrameId> {
    let mut iter = lists.into_iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };
    let rest: Vec<BTreeSet<FrameId>> = iter.map(|l| l.into_iter().collect()).collect();
    first
        .into_iter()
        .filter(|f| rest.iter().all(|set| set.contains(f)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::identity::Identity;
    use crate::model::extension::Extension;

    fn frame(model: &mut Model, name: &str, supers: &[FrameId]) -> FrameId {
        let f = model.add_frame(Identity::from_id(name), false).unwrap();
        for s in supers {
            model.add_super_link(f, *s).unwrap();
        }
        f
    }

    #[test]
    fn single_disjunct_degenerates_to_frame() {
        let mut model = Model::new(ModelConfig::default());
        let root = model.root();
        let dog = frame(&mut model, "Dog", &[root]);
        let resolved = Disjunction::resolve(&model, [FrameType::Model(dog)]).unwrap();
        assert_eq!(resolved, FrameType::Model(dog));
    }

    #[test]
    fn duplicates_and_subsumed_disjuncts_collapse() {
        let mut model = Model::new(ModelConfig::default());
        let root = model.root();
        let cat = frame(&mut model, "Cat", &[root]);
        let dog = frame(&mut model, "Dog", &[root]);
        let beagle = frame(&mut model, "Beagle", &[dog]);

        let a = Disjunction::resolve(&model, [FrameType::Model(dog), FrameType::Model(dog), FrameType::Model(cat)]).unwrap();
        let b = Disjunction::resolve(&model, [FrameType::Model(cat), FrameType::Model(dog)]).unwrap();
        assert_eq!(a, b);
        let c = Disjunction::resolve(&model, [FrameType::Model(beagle), FrameType::Model(cat), FrameType::Model(dog)]).unwrap();
        assert_eq!(c, b);
    }

    #[test]
    fn nested_disjunctions_flatten() {
        let mut model = Model::new(ModelConfig::default());
        let root = model.root();
        let a = frame(&mut model, "A", &[root]);
        let b = frame(&mut model, "B", &[root]);
        let c = frame(&mut model, "C", &[root]);
        let inner = Disjunction::resolve(&model, [FrameType::Model(a), FrameType::Model(b)]).unwrap();
        let outer = Disjunction::resolve(&model, [inner, FrameType::Model(c)]).unwrap();
        let FrameType::Disjunction(d) = outer else {
            panic!("expected a disjunction");
        };
        assert_eq!(d.disjuncts().collect::<Vec<_>>(), vec![a, b, c]);
    }

    #[test]
    fn empty_and_extension_inputs_rejected() {
        let mut model = Model::new(ModelConfig::default());
        let root = model.root();
        let dog = frame(&mut model, "Dog", &[root]);
        assert!(matches!(
            Disjunction::resolve(&model, Vec::new()),
            Err(ModelError::EmptyDisjunction)
        ));
        let ext = Extension::create(&model, dog.into(), Vec::new(), false).unwrap();
        assert!(matches!(
            Disjunction::resolve(&model, [ext]),
            Err(ModelError::ExtensionInDisjunction { .. })
        ));
    }

    #[test]
    fn subsumer_is_closest_common_ancestor() {
        let mut model = Model::new(ModelConfig::default());
        let root = model.root();
        let animal = frame(&mut model, "Animal", &[root]);
        let dog = frame(&mut model, "Dog", &[animal]);
        let cat = frame(&mut model, "Cat", &[animal]);
        let FrameType::Disjunction(d) = Disjunction::resolve(&model, [FrameType::Model(dog), FrameType::Model(cat)]).unwrap() else {
            panic!("expected a disjunction");
        };
        assert_eq!(d.subsumer(&model), animal);
    }

    #[test]
    fn ambiguous_diamond_climbs_to_root() {
        let mut model = Model::new(ModelConfig::default());
        let root = model.root();
        let x = frame(&mut model, "X", &[root]);
        let y = frame(&mut model, "Y", &[root]);
        let a = frame(&mut model, "A", &[x, y]);
        let b = frame(&mut model, "B", &[x, y]);
        let FrameType::Disjunction(d) = Disjunction::resolve(&model, [FrameType::Model(a), FrameType::Model(b)]).unwrap() else {
            panic!("expected a disjunction");
        };
        assert_eq!(d.subsumer(&model), root);
    }

    #[test]
    fn disjunction_subsumes_its_disjuncts() {
        let mut model = Model::new(ModelConfig::default());
        let root = model.root();
        let dog = frame(&mut model, "Dog", &[root]);
        let cat = frame(&mut model, "Cat", &[root]);
        let beagle = frame(&mut model, "Beagle", &[dog]);
        let either = Disjunction::resolve(&model, [FrameType::Model(dog), FrameType::Model(cat)]).unwrap();
        assert!(model.subsumes(&either, &beagle.into()));
        assert!(model.subsumes(&root.into(), &either));
        assert!(!model.subsumes(&dog.into(), &either));
    }
}
