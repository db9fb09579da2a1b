use std::path::PathBuf;

use export_core::{
    active_categories, convert as convert_tasks, image_urls, label_config, read_document,
    ConvertOptions, Error, ExportOptions, Exporter,
};
use pyo3::prelude::*;
use pyo3::types::PyList;

mod convert;

use convert::{json_to_py, py_to_results, summary_to_py, to_py_err};

/// Export detections to a COCO JSON file. Returns a summary dict, or `None`
/// when `results` is empty and nothing was written.
#[pyfunction]
#[pyo3(signature = (
    results,
    output_json_path,
    validate = false,
    debug = false,
    include_masks = true,
    indent = Some(4),
    drop_empty = false
))]
#[allow(clippy::too_many_arguments)]
fn export_annotations(
    py: Python<'_>,
    results: &Bound<'_, PyList>,
    output_json_path: PathBuf,
    validate: bool,
    debug: bool,
    include_masks: bool,
    indent: Option<i64>,
    drop_empty: bool,
) -> PyResult<Option<PyObject>> {
    let indent = match indent {
        Some(n) if n < 0 => {
            return Err(to_py_err(Error::Config(format!(
                "indent must be non-negative, got {n}"
            ))))
        }
        other => other.map(|n| n as usize),
    };
    let results = py_to_results(results)?;
    let exporter = Exporter::new(ExportOptions {
        include_masks,
        validate,
        debug,
        indent,
        drop_empty,
        ..Default::default()
    });

    let summary = py
        .allow_threads(|| exporter.export(&results, &output_json_path))
        .map_err(to_py_err)?;
    summary.map(|s| summary_to_py(py, &s)).transpose()
}

/// Convert a COCO JSON file into a list of Label Studio task dicts.
#[pyfunction]
#[pyo3(signature = (coco_path, image_server_url, include_boxes = false))]
fn coco_to_ls_tasks(
    py: Python<'_>,
    coco_path: PathBuf,
    image_server_url: &str,
    include_boxes: bool,
) -> PyResult<PyObject> {
    let dataset = read_document(&coco_path).map_err(to_py_err)?;
    let options = ConvertOptions {
        include_boxes,
        ..Default::default()
    };
    let tasks = convert_tasks(&dataset, &image_urls(&dataset, image_server_url), &options)
        .map_err(to_py_err)?;
    let value = serde_json::to_value(&tasks).map_err(|e| to_py_err(e.into()))?;
    json_to_py(py, &value)
}

/// Labeling config XML for the categories a COCO file actually uses.
#[pyfunction]
fn build_label_config(coco_path: PathBuf) -> PyResult<String> {
    let dataset = read_document(&coco_path).map_err(to_py_err)?;
    Ok(label_config(&active_categories(&dataset)))
}

#[pymodule]
fn ls_export(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_function(wrap_pyfunction!(export_annotations, m)?)?;
    m.add_function(wrap_pyfunction!(coco_to_ls_tasks, m)?)?;
    m.add_function(wrap_pyfunction!(build_label_config, m)?)?;
    Ok(())
}
