//! Boom Filter Core - filter tree to aggregation pipeline compiler
//!
//! Turns the boolean filter trees built in an alert-filter editor, together
//! with saved arithmetic and list variables and the alert schema, into a
//! `$project` + `$match` aggregation pipeline. Python bindings are available
//! behind the `python` feature.

pub mod compiler;
pub mod config;
pub mod error;
pub mod expression;
pub mod filter;
pub mod resolver;
pub mod validator;

#[cfg(test)]
mod testing;

pub use compiler::{CompilerContext, Pipeline, Stage};
pub use config::{load_catalog, load_filters, load_schema, Catalog, CompilerConfig, Schema};
pub use error::{FilterError, Result};
pub use filter::{Block, Condition, FilterArena, Node, OperatorKind};
pub use resolver::FieldResolver;
pub use validator::{format_pipeline, is_valid_pipeline, validate_pipeline, ValidationIssue};

#[cfg(feature = "python")]
mod python {
    use crate::compiler::CompilerContext;
    use crate::expression::{self, FieldScope};
    use once_cell::sync::OnceCell;
    use parking_lot::RwLock;
    use pyo3::exceptions::PyRuntimeError;
    use pyo3::prelude::*;
    use std::sync::Arc;

    // ========================================================================
    // Cached Context
    // ========================================================================

    /// Global compiler context
    static CONTEXT: OnceCell<Arc<RwLock<CompilerContext>>> = OnceCell::new();

    fn cached_context() -> PyResult<Arc<RwLock<CompilerContext>>> {
        CONTEXT
            .get()
            .cloned()
            .ok_or_else(|| PyRuntimeError::new_err("Context not initialized. Call init_context() first."))
    }

    /// JSON text of a `str` argument, or of any object `json.dumps` accepts
    fn json_text(obj: &Bound<'_, PyAny>) -> PyResult<String> {
        if let Ok(text) = obj.extract::<String>() {
            return Ok(text);
        }
        let json = PyModule::import(obj.py(), "json")?;
        json.call_method1("dumps", (obj,))?.extract()
    }

    // ========================================================================
    // Python Functions
    // ========================================================================

    /// Load schema, saved variables and options (call once at startup)
    ///
    /// Calling it again replaces the cached context and drops parsed
    /// expressions of the old variables. Variables are checked
    /// against the schema; a list variable shadowing a schema field or a
    /// self-referencing arithmetic variable raises `ValueError`.
    #[pyfunction]
    #[pyo3(signature = (schema, catalog=None, config=None))]
    fn init_context(
        schema: &Bound<'_, PyAny>,
        catalog: Option<&Bound<'_, PyAny>>,
        config: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<()> {
        let schema = json_text(schema)?;
        let catalog = catalog.map(json_text).transpose()?;
        let config = config.map(json_text).transpose()?;

        let context = CompilerContext::from_json(
            &schema,
            catalog.as_deref().unwrap_or("{}"),
            config.as_deref(),
        )?;
        context.catalog.validate(&context.schema)?;
        expression::cache::clear_cache();

        if let Some(existing) = CONTEXT.get() {
            *existing.write() = context;
        } else {
            let _ = CONTEXT.set(Arc::new(RwLock::new(context)));
        }
        Ok(())
    }

    #[pyfunction]
    fn is_context_initialized() -> bool {
        CONTEXT.get().is_some()
    }

    /// Compile a filter (one root block or a list of them) to pipeline JSON
    #[pyfunction]
    fn compile_filters(filters: &Bound<'_, PyAny>) -> PyResult<String> {
        let filters = json_text(filters)?;
        let context = cached_context()?;
        let context = context.read();
        Ok(context.compile_json(&filters)?.to_json()?)
    }

    /// Compile on tokio's blocking pool, returning an awaitable
    ///
    /// # Example (Python)
    /// ```python
    /// pipeline = json.loads(await compile_filters_async(tree))
    /// ```
    #[pyfunction]
    fn compile_filters_async<'py>(
        py: Python<'py>,
        filters: &Bound<'py, PyAny>,
    ) -> PyResult<Bound<'py, PyAny>> {
        let filters = json_text(filters)?;
        let context = cached_context()?;

        pyo3_async_runtimes::tokio::future_into_py(py, async move {
            tokio::task::spawn_blocking(move || {
                let context = context.read();
                Ok::<String, PyErr>(context.compile_json(&filters)?.to_json()?)
            })
            .await
            .map_err(|e| PyRuntimeError::new_err(format!("Compilation task panicked: {}", e)))?
        })
    }

    /// Structural check of a pipeline; `False` means "no valid query"
    #[pyfunction]
    fn validate_pipeline(pipeline: &Bound<'_, PyAny>) -> PyResult<bool> {
        let text = json_text(pipeline)?;
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(crate::error::FilterError::from)?;
        Ok(crate::validator::is_valid_pipeline(&value))
    }

    /// Render a math-notation expression as an aggregation expression (JSON)
    #[pyfunction]
    #[pyo3(signature = (expr, array_element=false))]
    fn latex_to_mongo(expr: &str, array_element: bool) -> String {
        let scope = if array_element {
            FieldScope::ArrayElement
        } else {
            FieldScope::Document
        };
        expression::convert_to_mongo(expr, scope).to_string()
    }

    /// Field names referenced by a math-notation expression
    #[pyfunction]
    fn extract_dependencies(expr: &str) -> Vec<String> {
        expression::extract_field_dependencies(expr)
    }

    // ========================================================================
    // Python Module Definition
    // ========================================================================

    #[pymodule]
    fn boom_filter_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(init_context, m)?)?;
        m.add_function(wrap_pyfunction!(is_context_initialized, m)?)?;
        m.add_function(wrap_pyfunction!(compile_filters, m)?)?;
        m.add_function(wrap_pyfunction!(compile_filters_async, m)?)?;
        m.add_function(wrap_pyfunction!(validate_pipeline, m)?)?;
        m.add_function(wrap_pyfunction!(latex_to_mongo, m)?)?;
        m.add_function(wrap_pyfunction!(extract_dependencies, m)?)?;
        Ok(())
    }
}
