use cfadebayer::{
    debayer, interpolate_xtrans, run_debayer, BayerPattern, CameraMatrix, CfaPattern,
    ColorSpace, Debayer, DebayerError, DebayerMethod, DebayerParameters, DynamicImageOwned,
    FbddMode, ImageOwned, ImageProps, NoiseAlgorithm, StatusMonitor, XTransPattern,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn setup() {
    color_backtrace::install();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn flat_mosaic<F: Fn(usize, usize) -> usize>(
    w: usize,
    h: usize,
    rgb: [f32; 3],
    color_at: F,
    cspace: ColorSpace,
) -> ImageOwned<f32> {
    let data = (0..w * h).map(|i| rgb[color_at(i / w, i % w)]).collect();
    ImageOwned::from_owned(data, w, h, cspace).unwrap()
}

fn assert_flat(img: &ImageOwned<f32>, rgb: [f32; 3], tol: f32, what: &str) {
    for (i, px) in img.as_slice().chunks_exact(3).enumerate() {
        for c in 0..3 {
            assert!(
                (px[c] - rgb[c]).abs() <= tol,
                "{what}: pixel {i} channel {c}: {} != {}",
                px[c],
                rgb[c]
            );
        }
    }
}

#[test]
fn flat_bayer_all_patterns() {
    setup();
    let rgb = [0.2, 0.5, 0.8];
    for pattern in BayerPattern::ALL {
        let mosaic = flat_mosaic(
            24,
            18,
            rgb,
            |r, c| pattern.color_at(r, c).index(),
            ColorSpace::Bayer(pattern),
        );
        let sp = debayer(&mosaic, &pattern, DebayerMethod::SuperPixel).unwrap();
        assert_eq!((sp.width(), sp.height(), sp.channels()), (12, 9, 3));
        assert_flat(&sp, rgb, 1e-6, &format!("{pattern} SuperPixel"));

        let bl = debayer(&mosaic, &pattern, DebayerMethod::Bilinear).unwrap();
        assert_eq!((bl.width(), bl.height()), (24, 18));
        assert_flat(&bl, rgb, 1e-5, &format!("{pattern} Bilinear"));

        let vng = debayer(&mosaic, &pattern, DebayerMethod::Vng).unwrap();
        assert_eq!((vng.width(), vng.height()), (24, 18));
        assert_flat(&vng, rgb, 1e-3, &format!("{pattern} VNG"));
    }
}

#[test]
fn flat_bayer_large() {
    setup();
    let rgb = [0.2, 0.5, 0.8];
    let pattern = BayerPattern::Rggb;
    let mosaic = flat_mosaic(
        512,
        512,
        rgb,
        |r, c| pattern.color_at(r, c).index(),
        ColorSpace::Bayer(pattern),
    );
    for method in [DebayerMethod::Bilinear, DebayerMethod::Vng] {
        let params = DebayerParameters {
            method,
            evaluate_noise: false,
            max_threads: Some(4),
            ..Default::default()
        };
        let out = mosaic.debayer(&params).unwrap();
        assert_eq!(out.method_id(), method.id());
        assert_flat(out.image(), rgb, 1e-3, method.id());
    }
}

#[test]
fn odd_superpixel_drops_last() {
    let mosaic = ImageOwned::from_owned(vec![0u16; 9 * 7], 9, 7, ColorSpace::Gray).unwrap();
    let sp = debayer(&mosaic, &BayerPattern::Bggr, DebayerMethod::SuperPixel).unwrap();
    assert_eq!((sp.width(), sp.height()), (4, 3));
}

#[test]
fn bilinear_ramp_interior() {
    let (w, h) = (40, 30);
    let ramp = |x: usize| 0.1 + 0.8 * x as f32 / (w - 1) as f32;
    let data = (0..w * h).map(|i| ramp(i % w)).collect();
    let mosaic = ImageOwned::from_owned(data, w, h, ColorSpace::Gray).unwrap();
    let out = debayer(&mosaic, &BayerPattern::Grbg, DebayerMethod::Bilinear).unwrap();
    let px = out.as_slice();
    for y in 2..h - 2 {
        for x in 2..w - 2 {
            for c in 0..3 {
                let v = px[3 * (y * w + x) + c];
                assert!((v - ramp(x)).abs() < 1e-5, "({x}, {y}) channel {c}: {v}");
            }
        }
    }
}

#[test]
fn too_small() {
    let mosaic = ImageOwned::from_owned(vec![0u8; 5 * 8], 5, 8, ColorSpace::Gray).unwrap();
    assert_eq!(
        debayer(&mosaic, &BayerPattern::Rggb, DebayerMethod::Vng),
        Err(DebayerError::Dimension {
            width: 5,
            height: 8,
            min_width: 6,
            min_height: 6
        })
    );
    let mosaic = ImageOwned::from_owned(vec![0u16; 64 * 64], 64, 64, ColorSpace::Gray).unwrap();
    assert!(matches!(
        interpolate_xtrans(&mosaic, &XTransPattern::default(), &CameraMatrix::identity(), 1),
        Err(DebayerError::Dimension { min_width: 512, .. })
    ));
}

#[test]
fn flat_xtrans() {
    setup();
    let rgb = [0.2, 0.5, 0.8];
    let pattern = XTransPattern::default();
    let mosaic = flat_mosaic(
        520,
        512,
        rgb,
        |r, c| pattern.color_at(r, c).index(),
        ColorSpace::XTrans(pattern),
    );
    for passes in [1, 2] {
        let out = interpolate_xtrans(&mosaic, &pattern, &CameraMatrix::identity(), passes).unwrap();
        assert_eq!((out.width(), out.height(), out.channels()), (520, 512, 3));
        assert_flat(&out, rgb, 1e-4, &format!("Markesteijn-{passes}"));
    }
    assert_eq!(
        interpolate_xtrans(&mosaic, &pattern, &CameraMatrix::identity(), 3),
        Err(DebayerError::UnsupportedMethod("Markesteijn-3".into()))
    );

    let params = DebayerParameters {
        xtrans_passes: 2,
        fbdd: FbddMode::Full,
        evaluate_noise: false,
        ..Default::default()
    };
    let out = mosaic.debayer(&params).unwrap();
    assert_eq!(out.method_id(), "Markesteijn-2");
    assert_eq!(out.pattern_id(), pattern.id());
}

#[test]
fn invalid_patterns() {
    assert!(matches!(
        "RGGX".parse::<CfaPattern>(),
        Err(DebayerError::InvalidPattern(_))
    ));
    assert!(matches!(
        "GGRGGBGGBGGRBRGRBGGGBGGRGGRGGBRBGBRX".parse::<CfaPattern>(),
        Err(DebayerError::InvalidPattern(_))
    ));
    assert!(matches!(
        "Markesteijn".parse::<DebayerMethod>(),
        Err(DebayerError::UnsupportedMethod(_))
    ));
}

#[test]
fn cancelled() {
    let pattern = BayerPattern::Rggb;
    let mosaic = flat_mosaic(
        64,
        64,
        [0.1, 0.2, 0.3],
        |r, c| pattern.color_at(r, c).index(),
        ColorSpace::Gray,
    );
    let monitor = StatusMonitor::new();
    monitor.cancel();
    let params = DebayerParameters::default();
    assert_eq!(
        run_debayer(&mosaic, &pattern.into(), &params, Some(&monitor)).unwrap_err(),
        DebayerError::Cancelled
    );
}

#[test]
fn progress_reported() {
    let mosaic = ImageOwned::from_owned(vec![0u8; 64 * 48], 64, 48, ColorSpace::Gray).unwrap();
    let monitor = StatusMonitor::new();
    let params = DebayerParameters {
        method: DebayerMethod::Bilinear,
        evaluate_noise: false,
        ..Default::default()
    };
    run_debayer(&mosaic, &BayerPattern::Gbrg.into(), &params, Some(&monitor)).unwrap();
    assert_eq!(monitor.total(), 48);
    assert_eq!(monitor.count(), 48);

    // noise evaluation runs as a last stage of one item per channel
    let params = DebayerParameters {
        method: DebayerMethod::Bilinear,
        max_threads: Some(1),
        ..Default::default()
    };
    let out = run_debayer(&mosaic, &BayerPattern::Gbrg.into(), &params, Some(&monitor)).unwrap();
    assert!(out.noise_estimates().is_some());
    assert_eq!(monitor.total(), 3);
    assert_eq!(monitor.count(), 3);
}

#[test]
fn noise_metadata() {
    setup();
    let (w, h) = (128, 128);
    let mut rng = StdRng::seed_from_u64(7);
    let data: Vec<f32> = (0..w * h)
        .map(|_| 0.5 + rng.gen_range(-0.02f32..0.02))
        .collect();
    let mosaic = ImageOwned::from_owned(data, w, h, ColorSpace::Bayer(BayerPattern::Rggb)).unwrap();
    let params = DebayerParameters {
        method: DebayerMethod::Bilinear,
        noise_algorithm: NoiseAlgorithm::KSigma,
        ..Default::default()
    };
    let out = mosaic.debayer(&params).unwrap();
    let noise = out.noise_estimates().unwrap();
    for est in noise {
        assert!(est.sigma > 0.0 && est.sigma < 0.02, "{est:?}");
        assert_eq!(est.algorithm, NoiseAlgorithm::KSigma);
    }
    let item = out.get_key("noise01").unwrap();
    assert_eq!(item.get_value().get_value_f64(), Some(noise[1].sigma));
    assert_eq!(
        out.get_key("NOISEA02").unwrap().get_value().get_value_string(),
        Some("K-Sigma")
    );
    let history: Vec<_> = out
        .get_metadata()
        .iter()
        .filter(|x| x.name() == "HISTORY")
        .filter_map(|x| x.get_value().get_value_string())
        .collect();
    assert_eq!(history[0], "Debayer.pattern: RGGB");
    assert_eq!(history[1], "Debayer.method: Bilinear");
    assert!(history[2].starts_with("Debayer.noiseEstimates: "));
}

#[test]
fn fbdd_flat_and_skipped() {
    let rgb = [0.3, 0.4, 0.6];
    for pattern in [BayerPattern::Bggr, BayerPattern::Rgbg] {
        let mosaic = flat_mosaic(
            32,
            32,
            rgb,
            |r, c| pattern.color_at(r, c).index(),
            ColorSpace::Bayer(pattern),
        );
        let params = DebayerParameters {
            method: DebayerMethod::Bilinear,
            fbdd: FbddMode::Full,
            evaluate_noise: false,
            ..Default::default()
        };
        let out = mosaic.debayer(&params).unwrap();
        assert_flat(out.image(), rgb, 1e-4, &format!("{pattern} FBDD"));
    }
}

#[test]
fn parameters_from_json() {
    let params: DebayerParameters = serde_json::from_str(
        r#"{
            "cfaPattern": "Auto",
            "debayerMethod": "SuperPixel",
            "fbdd": "Reduced",
            "evaluateNoise": false,
            "noiseEvaluationAlgorithm": "K-Sigma",
            "maxThreads": 2
        }"#,
    )
    .unwrap();
    assert_eq!(params.pattern, None);
    assert_eq!(params.method, DebayerMethod::SuperPixel);
    assert_eq!(params.fbdd, FbddMode::Reduced);
    assert_eq!(params.noise_algorithm, NoiseAlgorithm::KSigma);
    assert_eq!(params.max_threads, Some(2));
    assert_eq!(params.xtrans_passes, 1);

    let mosaic = ImageOwned::from_owned(
        vec![1000u16; 16 * 16],
        16,
        16,
        ColorSpace::Bayer(BayerPattern::Grbg),
    )
    .unwrap();
    let out = DynamicImageOwned::from(mosaic).debayer(&params).unwrap();
    assert_eq!(out.pattern_id(), "GRBG");
    assert_eq!(out.method_id(), "SuperPixel");
    assert!(out.noise_estimates().is_none());
    assert_eq!(out.image().width(), 8);
}

#[test]
fn vng_beats_bilinear_on_edges() {
    let (w, h) = (48, 40);
    let scenes: [fn(usize, usize) -> [f32; 3]; 2] = [
        |x, _| if x % 12 < 6 { [0.2; 3] } else { [0.8; 3] },
        |x, y| {
            let (dx, dy) = (x as f32 - 24.0, y as f32 - 20.0);
            if dx * dx + dy * dy < 100.0 {
                [0.7, 0.6, 0.5]
            } else {
                [0.2, 0.3, 0.25]
            }
        },
    ];
    for scene in scenes {
        let truth: Vec<f32> = (0..w * h).flat_map(|i| scene(i % w, i / w)).collect();
        for pattern in [
            BayerPattern::Rggb,
            BayerPattern::Grbg,
            BayerPattern::Gbrg,
            BayerPattern::Bggr,
        ] {
            let data = (0..w * h)
                .map(|i| truth[3 * i + pattern.color_at(i / w, i % w).index()])
                .collect();
            let mosaic = ImageOwned::from_owned(data, w, h, ColorSpace::Bayer(pattern)).unwrap();
            let mae = |img: &ImageOwned<f32>| {
                let px = img.as_slice();
                let (mut sum, mut n) = (0f64, 0usize);
                for y in 4..h - 4 {
                    for x in 4..w - 4 {
                        for c in 0..3 {
                            let i = 3 * (y * w + x) + c;
                            sum += (px[i] - truth[i]).abs() as f64;
                            n += 1;
                        }
                    }
                }
                sum / n as f64
            };
            let bl = mae(&debayer(&mosaic, &pattern, DebayerMethod::Bilinear).unwrap());
            let vng = mae(&debayer(&mosaic, &pattern, DebayerMethod::Vng).unwrap());
            assert!(vng < bl, "{pattern}: VNG {vng} >= bilinear {bl}");
        }
    }
}

#[test]
fn mae_ordering_smooth() {
    setup();
    let (w, h) = (64, 48);
    let scene = |x: usize, y: usize| {
        let l = 0.5 + 0.3 * (0.12 * x as f32).sin() * (0.09 * y as f32).cos();
        let hue = 0.05 * (0.05 * x as f32 + 0.04 * y as f32).sin();
        [0.9 * l + hue, l, 0.7 * l - hue]
    };
    let truth: Vec<f32> = (0..w * h).flat_map(|i| scene(i % w, i / w)).collect();
    // half resolution output pixel (x / 2, y / 2) stands in for full resolution pixel (x, y)
    let mae = |img: &ImageOwned<f32>, scale: usize| {
        let px = img.as_slice();
        let stride = img.width();
        let (mut sum, mut n) = (0f64, 0usize);
        for y in 4..h - 4 {
            for x in 4..w - 4 {
                let o = 3 * ((y / scale) * stride + x / scale);
                for c in 0..3 {
                    sum += (px[o + c] - truth[3 * (y * w + x) + c]).abs() as f64;
                    n += 1;
                }
            }
        }
        sum / n as f64
    };
    for pattern in BayerPattern::ALL {
        let data = (0..w * h)
            .map(|i| truth[3 * i + pattern.color_at(i / w, i % w).index()])
            .collect();
        let mosaic = ImageOwned::from_owned(data, w, h, ColorSpace::Bayer(pattern)).unwrap();
        let sp = mae(&debayer(&mosaic, &pattern, DebayerMethod::SuperPixel).unwrap(), 2);
        let bl = mae(&debayer(&mosaic, &pattern, DebayerMethod::Bilinear).unwrap(), 1);
        let vng = mae(&debayer(&mosaic, &pattern, DebayerMethod::Vng).unwrap(), 1);
        assert!(sp >= bl, "{pattern}: SuperPixel {sp} < bilinear {bl}");
        assert!(bl >= vng, "{pattern}: bilinear {bl} < VNG {vng}");
    }
}
