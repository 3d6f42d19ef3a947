use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::error::{ColocationError, Result};
use crate::models::{AuxSpec, GriddedSeries};
use crate::readers::{GriddedReader, ReadRequest};

/// Computes a derived variable from its input fields (in `vars_required` order)
pub type AuxFn = fn(&[GriddedSeries]) -> Result<GriddedSeries>;

/// Named auxiliary functions available to `model_read_aux`
#[derive(Clone)]
pub struct AuxRegistry {
    funcs: HashMap<String, AuxFn>,
}

impl AuxRegistry {
    pub fn empty() -> Self {
        Self {
            funcs: HashMap::new(),
        }
    }

    /// Registry with `add_cubes`, `subtract_cubes`, `multiply_cubes` and `divide_cubes`
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("add_cubes", add_cubes);
        registry.register("subtract_cubes", subtract_cubes);
        registry.register("multiply_cubes", multiply_cubes);
        registry.register("divide_cubes", divide_cubes);
        registry
    }

    pub fn register(&mut self, name: &str, fun: AuxFn) {
        self.funcs.insert(name.to_string(), fun);
    }

    pub fn get(&self, name: &str) -> Result<AuxFn> {
        self.funcs.get(name).copied().ok_or_else(|| {
            let mut known: Vec<&str> = self.funcs.keys().map(String::as_str).collect();
            known.sort_unstable();
            ColocationError::InvalidFormat(format!(
                "Unknown auxiliary function '{}' (registered: {})",
                name,
                known.join(", ")
            ))
        })
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.funcs.keys().cloned().collect()
    }
}

impl Default for AuxRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn binary_op(
    inputs: &[GriddedSeries],
    name: &str,
    units: fn(&str, &str) -> String,
    op: fn(f64, f64) -> f64,
) -> Result<GriddedSeries> {
    let [a, b] = inputs else {
        return Err(ColocationError::InvalidFormat(format!(
            "{} needs exactly 2 input fields, got {}",
            name,
            inputs.len()
        )));
    };
    if !a.same_grid(b) || a.times != b.times {
        return Err(ColocationError::DataExtraction(format!(
            "{}: {} and {} are not on the same grid and time axis",
            name, a.var_name, b.var_name
        )));
    }

    let mut values = a.values.clone();
    values.zip_mut_with(&b.values, |x, y| *x = op(*x, *y));

    Ok(GriddedSeries {
        units: units(&a.units, &b.units),
        ts_type: a.ts_type.max(b.ts_type),
        values,
        ..a.clone()
    })
}

fn first_units(a: &str, _b: &str) -> String {
    a.to_string()
}

fn product_units(a: &str, b: &str) -> String {
    match (a, b) {
        ("1", other) | (other, "1") => other.to_string(),
        _ => format!("{} {}", a, b),
    }
}

fn ratio_units(a: &str, b: &str) -> String {
    if b == "1" {
        a.to_string()
    } else if a == b {
        "1".to_string()
    } else {
        format!("{} / ({})", a, b)
    }
}

pub fn add_cubes(inputs: &[GriddedSeries]) -> Result<GriddedSeries> {
    binary_op(inputs, "add_cubes", first_units, |x, y| x + y)
}

pub fn subtract_cubes(inputs: &[GriddedSeries]) -> Result<GriddedSeries> {
    binary_op(inputs, "subtract_cubes", first_units, |x, y| x - y)
}

pub fn multiply_cubes(inputs: &[GriddedSeries]) -> Result<GriddedSeries> {
    binary_op(inputs, "multiply_cubes", product_units, |x, y| x * y)
}

pub fn divide_cubes(inputs: &[GriddedSeries]) -> Result<GriddedSeries> {
    binary_op(inputs, "divide_cubes", ratio_units, |x, y| {
        if y == 0.0 {
            f64::NAN
        } else {
            x / y
        }
    })
}

/// A gridded reader plus derived variables computed from what it provides
#[derive(Clone)]
pub struct GriddedSource {
    reader: Arc<dyn GriddedReader>,
    aux: BTreeMap<String, (AuxSpec, AuxFn)>,
}

impl GriddedSource {
    pub fn new(reader: Arc<dyn GriddedReader>) -> Self {
        Self {
            reader,
            aux: BTreeMap::new(),
        }
    }

    pub fn data_id(&self) -> &str {
        self.reader.data_id()
    }

    /// Register `var_name` as computed by `spec.fun` from `spec.vars_required`
    pub fn add_aux_compute(&mut self, var_name: &str, spec: &AuxSpec, registry: &AuxRegistry) -> Result<()> {
        if spec.vars_required.is_empty() {
            return Err(ColocationError::InvalidFormat(format!(
                "Auxiliary variable {} has no input variables",
                var_name
            )));
        }
        let fun = registry.get(&spec.fun)?;
        debug!(
            "{}: registered {} = {}({})",
            self.data_id(),
            var_name,
            spec.fun,
            spec.vars_required.join(", ")
        );
        self.aux.insert(var_name.to_string(), (spec.clone(), fun));
        Ok(())
    }

    /// Variables readable directly plus aux variables whose inputs are all readable
    pub fn provides_variables(&self) -> BTreeSet<String> {
        let mut vars = self.reader.provides_variables();
        let computable: Vec<String> = self
            .aux
            .iter()
            .filter(|(_, (spec, _))| spec.vars_required.iter().all(|v| vars.contains(v)))
            .map(|(name, _)| name.clone())
            .collect();
        vars.extend(computable);
        vars
    }

    pub fn read(&self, request: &ReadRequest) -> Result<GriddedSeries> {
        let Some((spec, fun)) = self.aux.get(&request.var_name) else {
            return self.reader.read(request);
        };

        let inputs = spec
            .vars_required
            .iter()
            .map(|v| self.reader.read(&request.for_variable(v)))
            .collect::<Result<Vec<_>>>()?;
        let computed = fun(&inputs)?;

        Ok(GriddedSeries {
            data_id: self.data_id().to_string(),
            ..computed.with_var_name(&request.var_name)
        })
    }

    /// Read with each vertical code in turn until one succeeds.
    ///
    /// Only a data coverage error moves on to the next candidate; any other
    /// error is returned immediately. With no candidates the request is read
    /// as given.
    pub fn read_first_available(
        &self,
        request: &ReadRequest,
        vert_candidates: &[String],
    ) -> Result<GriddedSeries> {
        if vert_candidates.is_empty() {
            return self.read(request);
        }

        let mut last_err = None;
        for vert in vert_candidates {
            let attempt = request.clone().with_vert_which(Some(vert.clone()));
            match self.read(&attempt) {
                Ok(series) => return Ok(series),
                Err(e) if e.is_data_coverage() => {
                    debug!(
                        "{}: {} not available as {} ({}), trying next vertical type",
                        self.data_id(),
                        request.var_name,
                        vert,
                        e
                    );
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| request.no_data(self.data_id())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TsType;
    use crate::readers::InMemoryGriddedReader;
    use chrono::NaiveDate;
    use ndarray::Array3;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn field(var: &str, value: f64) -> GriddedSeries {
        let t = NaiveDate::from_ymd_opt(2010, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        GriddedSeries::new(
            "TM5",
            var,
            "1",
            TsType::Monthly,
            vec![t],
            vec![0.0],
            vec![0.0, 10.0],
            Array3::from_elem((1, 1, 2), value),
        )
        .unwrap()
    }

    fn reader() -> Arc<InMemoryGriddedReader> {
        Arc::new(
            InMemoryGriddedReader::new("TM5")
                .with_series(field("od550so4", 0.1))
                .with_series(field("od550oa", 0.2))
                .with_vertical(field("ec550dryaer", 30.0), "ModelLevel"),
        )
    }

    #[test]
    fn test_builtins() {
        let sum = add_cubes(&[field("a", 1.0), field("b", 2.0)]).unwrap();
        assert_eq!(sum.values[[0, 0, 1]], 3.0);
        let ratio = divide_cubes(&[field("a", 1.0), field("b", 0.0)]).unwrap();
        assert!(ratio.values[[0, 0, 0]].is_nan());
        assert!(add_cubes(&[field("a", 1.0)]).is_err());
    }

    #[test]
    fn test_aux_variable_is_provided_and_computed() {
        let registry = AuxRegistry::with_builtins();
        let mut source = GriddedSource::new(reader());

        source
            .add_aux_compute("od550sum", &AuxSpec::new("add_cubes", &["od550so4", "od550oa"]), &registry)
            .unwrap();
        source
            .add_aux_compute("od550bad", &AuxSpec::new("add_cubes", &["od550so4", "missing"]), &registry)
            .unwrap();

        let vars = source.provides_variables();
        assert!(vars.contains("od550sum"));
        assert!(!vars.contains("od550bad"));

        let sum = source.read(&ReadRequest::new("od550sum")).unwrap();
        assert_eq!(sum.var_name, "od550sum");
        assert!((sum.values[[0, 0, 0]] - 0.3).abs() < 1e-12);

        assert!(source
            .add_aux_compute("x", &AuxSpec::new("no_such_fun", &["od550so4"]), &registry)
            .is_err());
    }

    #[test]
    fn test_vertical_fallback() {
        let source = GriddedSource::new(reader());
        let candidates = vec!["Surface".to_string(), "ModelLevel".to_string()];

        let series = source
            .read_first_available(&ReadRequest::new("ec550dryaer"), &candidates)
            .unwrap();
        assert_eq!(series.values[[0, 0, 0]], 30.0);

        let err = source
            .read_first_available(&ReadRequest::new("ec550dryaer"), &candidates[..1])
            .unwrap_err();
        assert!(err.is_data_coverage());
    }

    struct BrokenSurfaceReader {
        calls: AtomicUsize,
    }

    impl GriddedReader for BrokenSurfaceReader {
        fn data_id(&self) -> &str {
            "BROKEN"
        }

        fn provides_variables(&self) -> BTreeSet<String> {
            ["od550aer".to_string()].into_iter().collect()
        }

        fn read(&self, _request: &ReadRequest) -> Result<GriddedSeries> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ColocationError::InvalidFormat("corrupt file".to_string()))
        }
    }

    #[test]
    fn test_fallback_stops_on_other_errors() {
        let reader = Arc::new(BrokenSurfaceReader {
            calls: AtomicUsize::new(0),
        });
        let source = GriddedSource::new(reader.clone());
        let candidates = vec!["Surface".to_string(), "ModelLevel".to_string()];

        let err = source
            .read_first_available(&ReadRequest::new("od550aer"), &candidates)
            .unwrap_err();
        assert!(matches!(err, ColocationError::InvalidFormat(_)));
        assert_eq!(reader.calls.load(Ordering::SeqCst), 1);
    }
}
