//! Affine backbone: strided convolutions, global average pooling and a
//! 12-parameter head.

use burn::{
    nn::{
        conv::{Conv3d, Conv3dConfig},
        BatchNorm, BatchNormConfig, Initializer, Linear, LinearConfig, PaddingConfig3d, Relu,
    },
    prelude::*,
};

/// Row-major 3x4 identity matrix.
pub const IDENTITY_AFFINE: [f32; 12] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0,
];

#[derive(Config, Debug)]
pub struct GlobalNetConfig {
    #[config(default = 2)]
    pub in_channels: usize,
    #[config(default = 8)]
    pub num_channel_initial: usize,
    /// Number of stride-2 convolution stages.
    #[config(default = 3)]
    pub extract_levels: usize,
}

impl GlobalNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> GlobalNet<B> {
        let stages = self.extract_levels.max(1);
        let mut convs = Vec::with_capacity(stages);
        let mut norms = Vec::with_capacity(stages);

        let mut in_ch = self.in_channels;
        for stage in 0..stages {
            let out_ch = self.num_channel_initial << stage;
            convs.push(
                Conv3dConfig::new([in_ch, out_ch], [3, 3, 3])
                    .with_stride([2, 2, 2])
                    .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                    .init(device),
            );
            norms.push(BatchNormConfig::new(out_ch).init(device));
            in_ch = out_ch;
        }

        // Zero weights: the head starts at exactly the identity offset added in forward.
        let fc = LinearConfig::new(in_ch, 12)
            .with_initializer(Initializer::Zeros)
            .init(device);

        GlobalNet {
            convs,
            norms,
            fc,
            activation: Relu::new(),
        }
    }
}

#[derive(Module, Debug)]
pub struct GlobalNet<B: Backend> {
    convs: Vec<Conv3d<B>>,
    norms: Vec<BatchNorm<B, 3>>,
    fc: Linear<B>,
    activation: Relu,
}

impl<B: Backend> GlobalNet<B> {
    /// `[B, C, D, H, W]` -> affine parameters `[B, 12]`.
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 2> {
        let mut x = x;
        for (conv, norm) in self.convs.iter().zip(&self.norms) {
            x = self.activation.forward(norm.forward(conv.forward(x)));
        }

        // Global average pooling: [B, C, D, H, W] -> [B, C]
        let x = x.flatten::<3>(2, 4).mean_dim(2).squeeze::<2>(2);
        let x = self.fc.forward(x);

        let batch_size = x.dims()[0];
        let identity = Tensor::<B, 1>::from_floats(IDENTITY_AFFINE, &x.device()).reshape([1, 12]);
        x + identity.repeat(&[batch_size, 1])
    }
}
