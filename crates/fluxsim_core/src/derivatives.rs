use crate::error::SimulationError;
use crate::traits::StateVars;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Maps each state variable to the evaluation field that holds its time-derivative,
/// e.g. `G -> dGdt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IndexMap<String, String>", into = "IndexMap<String, String>")]
pub struct Derivatives {
    map: IndexMap<String, String>,
}

impl Derivatives {
    pub fn new<I, S, D>(pairs: I) -> Result<Self, SimulationError>
    where
        I: IntoIterator<Item = (S, D)>,
        S: Into<String>,
        D: Into<String>,
    {
        let mut map = IndexMap::new();
        for (state, field) in pairs {
            let state = state.into();
            if map.contains_key(&state) {
                return Err(SimulationError::Schema(format!(
                    "state variable `{state}` has more than one derivative"
                )));
            }
            map.insert(state, field.into());
        }
        if map.is_empty() {
            return Err(SimulationError::Schema(
                "at least one state variable is required".to_string(),
            ));
        }
        Ok(Self { map })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// (state name, derivative field) pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(s, d)| (s.as_str(), d.as_str()))
    }

    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    /// Fails unless `state` declares exactly the variables this mapping covers.
    pub fn check_state(&self, state: &StateVars) -> Result<(), SimulationError> {
        for name in self.map.keys() {
            if !state.contains_key(name) {
                return Err(SimulationError::Schema(format!(
                    "state variable `{name}` has a derivative but no initial value"
                )));
            }
        }
        for name in state.keys() {
            if !self.map.contains_key(name) {
                return Err(SimulationError::Schema(format!(
                    "state variable `{name}` has no derivative"
                )));
            }
        }
        Ok(())
    }
}

impl TryFrom<IndexMap<String, String>> for Derivatives {
    type Error = SimulationError;

    fn try_from(map: IndexMap<String, String>) -> Result<Self, Self::Error> {
        Derivatives::new(map)
    }
}

impl From<Derivatives> for IndexMap<String, String> {
    fn from(value: Derivatives) -> Self {
        value.map
    }
}

#[cfg(test)]
mod tests {
    use super::Derivatives;
    use crate::traits::StateVars;

    #[test]
    fn keeps_declaration_order() {
        let d = Derivatives::new([("G", "dGdt"), ("A", "dAdt")]).unwrap();
        let names: Vec<_> = d.state_names().collect();
        assert_eq!(names, vec!["G", "A"]);
        let pairs: Vec<_> = d.iter().collect();
        assert_eq!(pairs, vec![("G", "dGdt"), ("A", "dAdt")]);
    }

    #[test]
    fn rejects_duplicates_and_empty() {
        assert!(Derivatives::new([("G", "dGdt"), ("G", "dG2dt")]).is_err());
        assert!(Derivatives::new(Vec::<(String, String)>::new()).is_err());
    }

    #[test]
    fn state_check_is_order_independent_but_exact() {
        let d = Derivatives::new([("G", "dGdt"), ("A", "dAdt")]).unwrap();

        let mut state = StateVars::new();
        state.insert("A".into(), 1.0);
        state.insert("G".into(), 2.0);
        assert!(d.check_state(&state).is_ok());

        state.insert("F".into(), 0.1);
        let err = d.check_state(&state).unwrap_err();
        assert!(err.to_string().contains("`F` has no derivative"));

        let mut missing = StateVars::new();
        missing.insert("G".into(), 2.0);
        let err = d.check_state(&missing).unwrap_err();
        assert!(err.to_string().contains("`A`"));
    }
}
