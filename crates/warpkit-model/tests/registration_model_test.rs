use burn::backend::Autodiff;
use burn::optim::GradientsParams;
use burn::tensor::{Distribution, Tensor};
use burn_ndarray::NdArray;
use warpkit_core::reference_grid;
use warpkit_model::warp::{affine_grid, warp};
use warpkit_model::{
    binary_dice, build_model, registration_loss, LossConfig, ModelConfig, RegistrationMethod,
};

type Backend = NdArray<f32>;
type TrainBackend = Autodiff<Backend>;

#[test]
fn loss_backpropagates_into_backbone() {
    let device = Default::default();
    let config = ModelConfig::new()
        .with_method(RegistrationMethod::Dvf)
        .with_num_channel_initial(2)
        .with_extract_levels(1)
        .with_integration_steps(3);
    let loss_config = LossConfig::new();

    let model = build_model::<TrainBackend>([6, 6, 6], [6, 6, 6], 1, &config, &loss_config, &device)
        .unwrap();

    let moving = Tensor::<TrainBackend, 5>::random([1, 1, 6, 6, 6], Distribution::Default, &device);
    let fixed = Tensor::<TrainBackend, 5>::random([1, 1, 6, 6, 6], Distribution::Default, &device);
    let label = moving.clone().greater_elem(0.5).float();
    let grid = reference_grid::<TrainBackend>([6, 6, 6], &device);

    let output = model
        .forward(moving, fixed.clone(), Some(label.clone()), grid)
        .unwrap();
    let terms = registration_loss(
        &loss_config,
        fixed,
        output.pred_fixed_image,
        Some(label),
        output.pred_fixed_label,
        output.ddf,
    );
    assert!(terms.label.is_some());

    let grads = terms.total.backward();
    let grads = GradientsParams::from_grads(grads, &model);
    assert!(grads.len() > 0);
}

#[test]
fn identity_affine_warp_keeps_labels() {
    let device = Default::default();
    let grid = reference_grid::<Backend>([5, 6, 7], &device);
    let label = Tensor::<Backend, 5>::random([2, 1, 5, 6, 7], Distribution::Default, &device)
        .greater_elem(0.5)
        .float();
    let theta = Tensor::<Backend, 1>::from_floats(
        [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        &device,
    )
    .reshape([1, 12])
    .repeat(&[2, 1]);

    let ddf = affine_grid(theta, grid.clone());
    let warped = warp(label.clone(), ddf, grid);
    assert!((binary_dice(label, warped) - 1.0).abs() < 1e-9);
}
