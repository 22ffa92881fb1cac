use chrono::NaiveDate;
use gdal::vector::LayerAccess;
use gdal::Dataset;
use psviz::core::export::{
    try_lock_export, DeploymentConfig, ExportParams, Exporter, IdwInterpolator,
};
use psviz::types::{PointSet, PsError, ScattererEpochRecord};

fn points() -> PointSet {
    let mut records = Vec::new();
    for (i, date) in [
        NaiveDate::from_ymd_opt(2021, 3, 1).unwrap(),
        NaiveDate::from_ymd_opt(2021, 3, 13).unwrap(),
    ]
    .into_iter()
    .enumerate()
    {
        for ps in 0..6u32 {
            records.push(ScattererEpochRecord {
                ps_id: ps,
                longitude: 121.0 + (ps % 3) as f64 * 0.02,
                latitude: 14.5 + (ps / 3) as f64 * 0.02,
                date,
                displacement_mm: ps as f64 - i as f64,
                average_mm: ps as f64 * -2.0,
            });
        }
    }
    PointSet::new(records)
}

fn enabled(params: ExportParams) -> Exporter {
    Exporter::new(params).with_deployment(DeploymentConfig {
        export_enabled: true,
    })
}

#[test]
fn test_export_writes_layer_and_raster() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let params = ExportParams {
        output_dir: dir.path().join("out"),
        width: 32,
        height: 16,
        ..ExportParams::default()
    };
    let exporter = enabled(params);
    let points = points();

    // a second export while one is running is refused
    {
        let _held = try_lock_export().expect("Export slot should be free");
        let busy = exporter.export_points(&points);
        assert!(matches!(busy, Err(PsError::ExportBusy)));
    }

    let report = exporter.export_points(&points).expect("Export failed");
    assert_eq!(report.rows_written, 12);
    assert_eq!(report.scatterers_interpolated, 6);
    assert!(report.vector_path.exists());
    assert!(report.raster_path.exists());
    assert!(report.raster_path.ends_with("velocity.tif"));

    let vector = Dataset::open(&report.vector_path).expect("Failed to open point layer");
    let layer = vector.layer(0).expect("Point layer missing");
    assert_eq!(layer.feature_count(), 12);

    let raster = Dataset::open(&report.raster_path).expect("Failed to open raster");
    assert_eq!(raster.raster_size(), (32, 16));
    let transform = raster.geo_transform().expect("Missing geotransform");
    assert!((transform[0] - 121.0).abs() < 1e-9);
    assert!((transform[3] - 14.52).abs() < 1e-9);
    assert!(transform[5] < 0.0);

    // exporting again replaces the previous outputs
    let again = exporter.export_points(&points).expect("Re-export failed");
    assert_eq!(again.raster_path, report.raster_path);

    // the full-dataset path reads the .mat pair first
    let missing = exporter.export(&["missing_ps_plot_ts_v-do.mat", "missing_ps_plot_v-do.mat"]);
    assert!(matches!(missing, Err(PsError::Io(_))));

    let empty = exporter.export_points(&PointSet::default());
    assert!(matches!(empty, Err(PsError::Export(_))));

    // an output directory that cannot be created is an export failure
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"file").expect("Failed to write file");
    let blocked = enabled(ExportParams {
        output_dir: blocker.join("out"),
        ..ExportParams::default()
    })
    .export_points(&points);
    assert!(matches!(blocked, Err(PsError::Export(_))));
}

#[test]
fn test_export_disabled_in_deployment() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let exporter = Exporter::new(ExportParams {
        output_dir: dir.path().to_path_buf(),
        ..ExportParams::default()
    })
    .with_deployment(DeploymentConfig::from_value(Some("true")));

    assert!(matches!(
        exporter.export_points(&points()),
        Err(PsError::ExportDisabled)
    ));
    assert!(matches!(
        exporter.export(&["a.mat", "b.mat"]),
        Err(PsError::ExportDisabled)
    ));
    assert!(!dir.path().join("velocity.tif").exists());
}

#[test]
fn test_interpolated_values_stay_within_sample_range() {
    let samples: Vec<(f64, f64, f64)> = (0..6)
        .map(|ps| {
            (
                121.0 + (ps % 3) as f64 * 0.02,
                14.5 + (ps / 3) as f64 * 0.02,
                ps as f64 * -2.0,
            )
        })
        .collect();
    let extent = points().extent().expect("Non-empty point set");
    let (grid, _) = IdwInterpolator::new(2.0, 0.0)
        .grid(&samples, &extent, 20, 10)
        .expect("Interpolation failed");

    assert_eq!(grid.dim(), (10, 20));
    assert!(grid.iter().all(|&v| (-10.0..=0.0).contains(&v)));
    assert!(grid.iter().all(|v| v.is_finite()));
    // top-left cell is nearest the north-west scatterer (ps 3, -6 mm/yr)
    assert!(grid[[0, 0]] < -4.0);
}
